//! Administrative command language
//!
//! A small textual control plane for slots and publications:
//!
//! ```text
//! CREATE PUBLICATION <name> FOR ALL TABLES
//! CREATE PUBLICATION <name> FOR TABLES a, b [WHERE <field> <op> <json>]
//! CREATE SLOT <name> FOR <publication> [AT <position>] [ENCODER <name>]
//! DROP SLOT <name>
//! ```
//!
//! Keywords are case-insensitive; names and JSON values are not. A
//! `WHERE` clause attaches the same row filter to every listed table.

use thiserror::Error;

use crate::engine::{CdcEngine, EngineError};
use crate::log::LogPosition;
use crate::publication::{FilterOp, Publication, RowFilter};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    CreateSlot {
        name: String,
        publication: String,
        at: Option<LogPosition>,
        encoder: Option<String>,
    },
    DropSlot {
        name: String,
    },
    CreatePublication {
        name: String,
        /// `None` selects all tables
        tables: Option<Vec<String>>,
        filter: Option<RowFilter>,
    },
}

/// Parse one statement.
pub fn parse(statement: &str) -> Result<AdminCommand, AdminError> {
    let tokens: Vec<&str> = statement.split_whitespace().collect();
    match tokens.as_slice() {
        [create, slot, rest @ ..]
            if keyword(create, "CREATE") && keyword(slot, "SLOT") && !rest.is_empty() =>
        {
            parse_create_slot(rest)
        }
        [drop, slot, name] if keyword(drop, "DROP") && keyword(slot, "SLOT") => {
            Ok(AdminCommand::DropSlot {
                name: (*name).to_string(),
            })
        }
        [create, publication, rest @ ..]
            if keyword(create, "CREATE")
                && keyword(publication, "PUBLICATION")
                && !rest.is_empty() =>
        {
            parse_create_publication(rest)
        }
        _ => Err(AdminError::Syntax(format!(
            "unrecognized statement: {}",
            statement
        ))),
    }
}

/// Parse and run one statement, returning a human-readable summary.
pub fn execute(engine: &CdcEngine, statement: &str) -> Result<String, AdminError> {
    match parse(statement)? {
        AdminCommand::CreateSlot {
            name,
            publication,
            at,
            encoder,
        } => {
            let start = at.unwrap_or_else(|| engine.log().head());
            let encoder = encoder.as_deref().unwrap_or("json");
            let slot = engine.create_slot(&name, &publication, encoder, start)?;
            Ok(format!(
                "created slot {} at position {}",
                slot.name, slot.restart_position
            ))
        }
        AdminCommand::DropSlot { name } => {
            engine.drop_slot(&name)?;
            Ok(format!("dropped slot {}", name))
        }
        AdminCommand::CreatePublication {
            name,
            tables,
            filter,
        } => {
            let mut publication = match &tables {
                None => Publication::all_tables(&name),
                Some(tables) => Publication::for_tables(&name, tables.iter().cloned()),
            };
            if let Some(filter) = filter {
                let tables = tables.ok_or_else(|| {
                    AdminError::Syntax("WHERE requires an explicit table list".to_string())
                })?;
                for table in tables {
                    publication = publication.with_row_filter(table, filter.clone());
                }
            }
            let created = engine.create_publication(publication)?;
            Ok(format!("created publication {}", created.name))
        }
    }
}

fn keyword(token: &str, expected: &str) -> bool {
    token.eq_ignore_ascii_case(expected)
}

fn parse_create_slot(rest: &[&str]) -> Result<AdminCommand, AdminError> {
    let name = rest[0].to_string();
    let mut publication = None;
    let mut at = None;
    let mut encoder = None;

    let mut i = 1;
    while i < rest.len() {
        match rest[i] {
            t if keyword(t, "FOR") => {
                publication = Some(clause_value(rest, i, "FOR")?.to_string());
                i += 2;
            }
            t if keyword(t, "AT") => {
                let raw = clause_value(rest, i, "AT")?;
                let position = raw.parse::<LogPosition>().map_err(|_| {
                    AdminError::Syntax(format!("AT expects a numeric position, got {}", raw))
                })?;
                at = Some(position);
                i += 2;
            }
            t if keyword(t, "ENCODER") => {
                encoder = Some(clause_value(rest, i, "ENCODER")?.to_string());
                i += 2;
            }
            t => {
                return Err(AdminError::Syntax(format!(
                    "unexpected token in CREATE SLOT: {}",
                    t
                )))
            }
        }
    }

    let publication = publication
        .ok_or_else(|| AdminError::Syntax("CREATE SLOT requires FOR <publication>".to_string()))?;
    Ok(AdminCommand::CreateSlot {
        name,
        publication,
        at,
        encoder,
    })
}

fn parse_create_publication(rest: &[&str]) -> Result<AdminCommand, AdminError> {
    let name = rest[0].to_string();
    if rest.len() < 2 || !keyword(rest[1], "FOR") {
        return Err(AdminError::Syntax(
            "CREATE PUBLICATION requires FOR ALL TABLES or FOR TABLES <list>".to_string(),
        ));
    }
    let body = &rest[2..];

    if body.len() >= 2 && keyword(body[0], "ALL") && keyword(body[1], "TABLES") {
        if body.len() > 2 {
            return Err(AdminError::Syntax(
                "FOR ALL TABLES takes no further clauses".to_string(),
            ));
        }
        return Ok(AdminCommand::CreatePublication {
            name,
            tables: None,
            filter: None,
        });
    }

    if body.is_empty() || !keyword(body[0], "TABLES") {
        return Err(AdminError::Syntax(
            "expected ALL TABLES or TABLES <list>".to_string(),
        ));
    }

    let mut tables = Vec::new();
    let mut i = 1;
    while i < body.len() && !keyword(body[i], "WHERE") {
        let table = body[i].trim_end_matches(',');
        if !table.is_empty() {
            tables.push(table.to_string());
        }
        i += 1;
    }
    if tables.is_empty() {
        return Err(AdminError::Syntax("TABLES requires at least one table".to_string()));
    }

    let filter = if i < body.len() {
        // WHERE <field> <op> <json>; the value may span tokens
        if body.len() < i + 4 {
            return Err(AdminError::Syntax(
                "WHERE requires <field> <op> <value>".to_string(),
            ));
        }
        let field = body[i + 1].to_string();
        let op_token = body[i + 2];
        let op = FilterOp::parse(op_token)
            .ok_or_else(|| AdminError::Syntax(format!("unknown operator: {}", op_token)))?;
        let value_raw = body[i + 3..].join(" ");
        let value = serde_json::from_str(&value_raw).map_err(|e| {
            AdminError::Syntax(format!("WHERE value is not valid JSON: {}", e))
        })?;
        Some(RowFilter { field, op, value })
    } else {
        None
    };

    Ok(AdminCommand::CreatePublication {
        name,
        tables: Some(tables),
        filter,
    })
}

fn clause_value<'a>(rest: &[&'a str], i: usize, clause: &str) -> Result<&'a str, AdminError> {
    rest.get(i + 1)
        .copied()
        .ok_or_else(|| AdminError::Syntax(format!("{} requires a value", clause)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_create_slot_full() {
        let cmd = parse("CREATE SLOT orders_slot FOR orders_pub AT 512 ENCODER json").unwrap();
        assert_eq!(
            cmd,
            AdminCommand::CreateSlot {
                name: "orders_slot".into(),
                publication: "orders_pub".into(),
                at: Some(LogPosition(512)),
                encoder: Some("json".into()),
            }
        );
    }

    #[test]
    fn test_parse_create_slot_requires_publication() {
        assert!(parse("CREATE SLOT s AT 0").is_err());
    }

    #[test]
    fn test_parse_drop_slot() {
        let cmd = parse("drop slot s").unwrap();
        assert_eq!(cmd, AdminCommand::DropSlot { name: "s".into() });
    }

    #[test]
    fn test_parse_publication_all_tables() {
        let cmd = parse("CREATE PUBLICATION everything FOR ALL TABLES").unwrap();
        assert_eq!(
            cmd,
            AdminCommand::CreatePublication {
                name: "everything".into(),
                tables: None,
                filter: None,
            }
        );
    }

    #[test]
    fn test_parse_publication_with_filter() {
        let cmd =
            parse(r#"CREATE PUBLICATION big FOR TABLES orders WHERE amount >= 100"#).unwrap();
        assert_eq!(
            cmd,
            AdminCommand::CreatePublication {
                name: "big".into(),
                tables: Some(vec!["orders".into()]),
                filter: Some(RowFilter {
                    field: "amount".into(),
                    op: FilterOp::Gte,
                    value: json!(100),
                }),
            }
        );
    }

    #[test]
    fn test_parse_publication_table_list() {
        let cmd = parse("CREATE PUBLICATION two FOR TABLES orders, users").unwrap();
        assert_eq!(
            cmd,
            AdminCommand::CreatePublication {
                name: "two".into(),
                tables: Some(vec!["orders".into(), "users".into()]),
                filter: None,
            }
        );
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse("MAKE ME A SANDWICH").is_err());
        assert!(parse("").is_err());
    }
}
