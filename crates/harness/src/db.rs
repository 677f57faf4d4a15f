use tempora_core::{schema::ColumnType, CoreError, FieldValue, Row, TableSchema};
use tempora_engine::{Engine, EngineError, MutationOutcome};

/// `class`: keeps its own `edition_time`, so it gets a history table only.
pub fn class_schema() -> Result<TableSchema, CoreError> {
    TableSchema::builder("class")
        .with_edition_time()
        .column("class_name", ColumnType::Text)
        .nullable("description", ColumnType::Text)
        .build(63)
}

/// `project`: no `edition_time`, so it gets history and tracking tables.
pub fn project_schema() -> Result<TableSchema, CoreError> {
    TableSchema::builder("project")
        .column("title", ColumnType::Text)
        .nullable("comment", ColumnType::Text)
        .build(63)
}

pub fn text_row(column: &str, value: &str) -> Row {
    let mut row = Row::new();
    row.insert(column.to_string(), FieldValue::Text(value.to_string()));
    row
}

/// An engine with `class` and `project` created and registered.
pub struct TestDb {
    pub engine: Engine,
}

impl TestDb {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_engine(Engine::open_in_memory()?)
    }

    /// Creates and registers the fixture tables on `engine`.
    pub fn with_engine(mut engine: Engine) -> Result<Self, EngineError> {
        engine.create_table(&class_schema()?)?;
        engine.create_table(&project_schema()?)?;
        Ok(Self { engine })
    }

    pub fn add_class(&mut self, name: &str) -> Result<(FieldValue, MutationOutcome), EngineError> {
        self.engine.insert("class", text_row("class_name", name))
    }

    pub fn rename_class(&mut self, pk: &FieldValue, name: &str) -> Result<MutationOutcome, EngineError> {
        self.engine.update("class", pk, text_row("class_name", name))
    }

    pub fn add_project(&mut self, title: &str) -> Result<(FieldValue, MutationOutcome), EngineError> {
        self.engine.insert("project", text_row("title", title))
    }

    pub fn retitle_project(&mut self, pk: &FieldValue, title: &str) -> Result<MutationOutcome, EngineError> {
        self.engine.update("project", pk, text_row("title", title))
    }

    pub fn history_len(&self, table: &str) -> Result<usize, EngineError> {
        Ok(self.engine.history_rows(table)?.len())
    }

    /// The text value of `column` in the live row `pk`.
    pub fn text(&self, table: &str, pk: &FieldValue, column: &str) -> Result<Option<String>, EngineError> {
        Ok(self
            .engine
            .get(table, pk)?
            .and_then(|row| row.get(column).and_then(|v| v.as_text().map(str::to_owned))))
    }
}
