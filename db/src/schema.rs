//! Structured schema descriptor, rendered per engine.
//!
//! The portal's tables are declared once as data ([`PORTAL_SCHEMA`]) and
//! rendered into each engine's dialect:
//!
//! | Logical type | Embedded | Networked |
//! |--------------|----------|-----------|
//! | [`ColumnType::Key`] | `INTEGER PRIMARY KEY AUTOINCREMENT` | `SERIAL PRIMARY KEY` |
//! | [`ColumnType::Timestamp`] | `DATETIME` | `TIMESTAMP` |
//! | [`ColumnType::Boolean`] | `BOOLEAN`, 0/1 defaults | `BOOLEAN`, `TRUE`/`FALSE` defaults |
//!
//! Every statement is `IF NOT EXISTS`, so applying the schema to an already
//! initialized store succeeds without changes. Tables may only reference
//! tables declared before them; rendering rejects anything else.

use crate::{DbError, EngineKind};

use self::ColumnType::{Boolean, Integer, Text, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-generated integer primary key.
    Key,
    Integer,
    Text,
    Boolean,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    /// `CURRENT_TIMESTAMP`
    Now,
    Text(&'static str),
    Integer(i64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<DefaultValue>,
}

impl Column {
    /// A `NOT NULL` column without default.
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            unique: false,
            default: None,
        }
    }

    pub const fn key(name: &'static str) -> Self {
        Self::new(name, ColumnType::Key)
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    pub const fn default(self, value: DefaultValue) -> Self {
        Self {
            default: Some(value),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    NoAction,
    Cascade,
}

/// `column` references the `id` key of `references`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub foreign_keys: &'static [ForeignKey],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Index {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schema {
    /// In dependency order.
    pub tables: &'static [Table],
    pub indexes: &'static [Index],
}

/// One rendered statement and the object it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaStatement {
    pub object: String,
    pub sql: String,
}

/// Accounts, questionnaire submissions, follow-up notes, the email audit log
/// and the admin discussion log.
pub const PORTAL_SCHEMA: Schema = Schema {
    tables: &[
        Table {
            name: "accounts",
            columns: &[
                Column::key("id"),
                Column::new("name", Text),
                Column::new("email", Text).unique(),
                Column::new("password_hash", Text).nullable(),
                Column::new("role", Text).default(DefaultValue::Text("student")),
                Column::new("created_at", Timestamp).default(DefaultValue::Now),
            ],
            foreign_keys: &[],
        },
        Table {
            name: "questionnaires",
            columns: &[
                Column::key("id"),
                Column::new("account_id", Integer),
                Column::new("consented", Boolean).default(DefaultValue::Bool(false)),
                Column::new("answers_json", Text),
                Column::new("risk_score", Integer).default(DefaultValue::Integer(0)),
                Column::new("risk_level", Text).default(DefaultValue::Text("normal")),
                Column::new("created_at", Timestamp).default(DefaultValue::Now),
            ],
            foreign_keys: &[ForeignKey {
                column: "account_id",
                references: "accounts",
                on_delete: OnDelete::Cascade,
            }],
        },
        Table {
            name: "followups",
            columns: &[
                Column::key("id"),
                Column::new("questionnaire_id", Integer),
                Column::new("admin_id", Integer),
                Column::new("note", Text),
                Column::new("created_at", Timestamp).default(DefaultValue::Now),
            ],
            foreign_keys: &[
                ForeignKey {
                    column: "questionnaire_id",
                    references: "questionnaires",
                    on_delete: OnDelete::Cascade,
                },
                ForeignKey {
                    column: "admin_id",
                    references: "accounts",
                    on_delete: OnDelete::NoAction,
                },
            ],
        },
        Table {
            name: "email_logs",
            columns: &[
                Column::key("id"),
                Column::new("questionnaire_id", Integer),
                Column::new("admin_id", Integer),
                Column::new("to_email", Text),
                Column::new("subject", Text),
                Column::new("body", Text),
                Column::new("status", Text).default(DefaultValue::Text("queued")),
                Column::new("error", Text).nullable(),
                Column::new("created_at", Timestamp).default(DefaultValue::Now),
            ],
            foreign_keys: &[
                ForeignKey {
                    column: "questionnaire_id",
                    references: "questionnaires",
                    on_delete: OnDelete::Cascade,
                },
                ForeignKey {
                    column: "admin_id",
                    references: "accounts",
                    on_delete: OnDelete::NoAction,
                },
            ],
        },
        Table {
            name: "admin_messages",
            columns: &[
                Column::key("id"),
                Column::new("admin_id", Integer),
                Column::new("message", Text),
                Column::new("created_at", Timestamp).default(DefaultValue::Now),
            ],
            foreign_keys: &[ForeignKey {
                column: "admin_id",
                references: "accounts",
                on_delete: OnDelete::Cascade,
            }],
        },
    ],
    indexes: &[
        Index {
            name: "idx_questionnaires_account",
            table: "questionnaires",
            columns: &["account_id", "created_at"],
        },
        Index {
            name: "idx_questionnaires_risk",
            table: "questionnaires",
            columns: &["risk_level"],
        },
        Index {
            name: "idx_followups_questionnaire",
            table: "followups",
            columns: &["questionnaire_id"],
        },
        Index {
            name: "idx_email_logs_questionnaire",
            table: "email_logs",
            columns: &["questionnaire_id"],
        },
    ],
};

impl Schema {
    /// Render every statement for `engine`, tables first, then indexes.
    pub fn render(&self, engine: EngineKind) -> Result<Vec<SchemaStatement>, DbError> {
        self.validate()?;

        let tables = self.tables.iter().map(|table| SchemaStatement {
            object: table.name.to_string(),
            sql: render_table(table, engine),
        });
        let indexes = self.indexes.iter().map(|index| SchemaStatement {
            object: index.name.to_string(),
            sql: format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                index.name,
                index.table,
                index.columns.join(", ")
            ),
        });

        Ok(tables.chain(indexes).collect())
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    fn validate(&self) -> Result<(), DbError> {
        for (position, table) in self.tables.iter().enumerate() {
            let declared = &self.tables[..position];
            if declared.iter().any(|t| t.name == table.name) {
                return Err(DbError::Configuration(format!(
                    "table `{}` is declared twice",
                    table.name
                )));
            }
            for fk in table.foreign_keys {
                if !table.columns.iter().any(|c| c.name == fk.column) {
                    return Err(DbError::Configuration(format!(
                        "foreign key column `{}.{}` does not exist",
                        table.name, fk.column
                    )));
                }
                let known = fk.references == table.name
                    || declared.iter().any(|t| t.name == fk.references);
                if !known {
                    return Err(DbError::Configuration(format!(
                        "table `{}` references `{}` before it is declared",
                        table.name, fk.references
                    )));
                }
            }
        }

        for index in self.indexes {
            let table = self.table(index.table).ok_or_else(|| {
                DbError::Configuration(format!(
                    "index `{}` is on unknown table `{}`",
                    index.name, index.table
                ))
            })?;
            if let Some(missing) = index
                .columns
                .iter()
                .find(|col| !table.columns.iter().any(|c| c.name == **col))
            {
                return Err(DbError::Configuration(format!(
                    "index `{}` uses unknown column `{}.{}`",
                    index.name, index.table, missing
                )));
            }
        }

        Ok(())
    }
}

fn render_table(table: &Table, engine: EngineKind) -> String {
    let columns = table.columns.iter().map(|c| render_column(c, engine));
    let foreign_keys = table.foreign_keys.iter().map(|fk| {
        let mut clause = format!(
            "FOREIGN KEY ({}) REFERENCES {}(id)",
            fk.column, fk.references
        );
        if fk.on_delete == OnDelete::Cascade {
            clause.push_str(" ON DELETE CASCADE");
        }
        clause
    });
    let body = columns
        .chain(foreign_keys)
        .collect::<Vec<_>>()
        .join(",\n    ");

    format!("CREATE TABLE IF NOT EXISTS {} (\n    {}\n)", table.name, body)
}

fn render_column(column: &Column, engine: EngineKind) -> String {
    let mut def = format!("{} {}", column.name, column_type(column.ty, engine));
    if column.ty == ColumnType::Key {
        return def;
    }
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if column.unique {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = column.default {
        def.push_str(" DEFAULT ");
        def.push_str(&render_default(default, engine));
    }
    def
}

fn column_type(ty: ColumnType, engine: EngineKind) -> &'static str {
    match (ty, engine) {
        (ColumnType::Key, EngineKind::Embedded) => "INTEGER PRIMARY KEY AUTOINCREMENT",
        (ColumnType::Key, EngineKind::Networked) => "SERIAL PRIMARY KEY",
        (ColumnType::Integer, _) => "INTEGER",
        (ColumnType::Text, _) => "TEXT",
        (ColumnType::Boolean, _) => "BOOLEAN",
        (ColumnType::Timestamp, EngineKind::Embedded) => "DATETIME",
        (ColumnType::Timestamp, EngineKind::Networked) => "TIMESTAMP",
    }
}

fn render_default(value: DefaultValue, engine: EngineKind) -> String {
    match (value, engine) {
        (DefaultValue::Now, _) => "CURRENT_TIMESTAMP".to_string(),
        (DefaultValue::Text(s), _) => format!("'{}'", s.replace('\'', "''")),
        (DefaultValue::Integer(n), _) => n.to_string(),
        (DefaultValue::Bool(b), EngineKind::Embedded) => u8::from(b).to_string(),
        (DefaultValue::Bool(b), EngineKind::Networked) => {
            String::from(if b { "TRUE" } else { "FALSE" })
        }
    }
}
