use tempfile::TempDir;
use tempora_engine::{Engine, EngineConfig, EngineError};

/// A database file shared by several engines, each on its own connection.
pub struct SharedDb {
    _dir: TempDir,
    path: String,
}

impl SharedDb {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tempora.db").to_string_lossy().into_owned();
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn connect(&self) -> Result<Engine, EngineError> {
        self.connect_with(EngineConfig::default())
    }

    pub fn connect_with(&self, config: EngineConfig) -> Result<Engine, EngineError> {
        Engine::open(&self.path, config)
    }
}
