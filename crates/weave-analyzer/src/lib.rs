#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **weave-analyzer** – static scope validator for weave blueprints (C2).
//!
//! Run once per blueprint, before any execution (`spec.md` §4.2). Rejects
//! blueprints that reference variables outside a handler's lexical scope:
//! `trigger.*`/`msg.*` fields of the triggering message (permissive if the
//! message has no declared schema), and `read.<alias>.<column>` bindings
//! introduced by a preceding `read` step in the same handler. All
//! violations are collected into one [`AnalysisReport`] rather than
//! failing on the first.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info};

use weave_types::{Blueprint, Handler, MatchCase, Row, Step};

/// One scope violation or embedded syntax error found during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzerError {
    /// A `{{ ... }}` expression references a variable outside the
    /// handler's scope.
    #[error("[{component}.{handler}] invalid variable '{variable}' in {location}: '{expression}'")]
    OutOfScopeVariable {
        /// Owning component.
        component: String,
        /// Handler name (the triggering message name).
        handler: String,
        /// Where in the step the expression appeared, e.g. `create.data.v`.
        location: String,
        /// The full expression string containing the bad reference.
        expression: String,
        /// The specific dotted path that is out of scope.
        variable: String,
    },
    /// A `{{ ... }}` region failed to parse.
    #[error("[{component}.{handler}] syntax error in {location}: '{expression}'")]
    SyntaxError {
        /// Owning component.
        component: String,
        /// Handler name.
        handler: String,
        /// Where in the step the expression appeared.
        location: String,
        /// The full (unparseable) expression string.
        expression: String,
    },
}

/// Aggregated analysis failure: every violation found across the whole
/// blueprint, in the order they were discovered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("static analysis failed:\n{}", .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"))]
pub struct AnalysisReport {
    /// Every violation found.
    pub errors: Vec<AnalyzerError>,
}

/// Runs static analysis over every component and handler in `blueprint`.
/// Returns `Ok(())` if every `{{ ... }}` expression resolves only to names
/// within its handler's scope; otherwise an [`AnalysisReport`] listing
/// every violation found.
pub fn analyze(blueprint: &Blueprint) -> Result<(), AnalysisReport> {
    let mut errors = Vec::new();
    for component in &blueprint.components {
        for handler in &component.handlers {
            analyze_handler(blueprint, &component.name, handler, &mut errors);
        }
    }
    if errors.is_empty() {
        info!("static analysis passed: all expressions are in scope");
        Ok(())
    } else {
        debug!(count = errors.len(), "static analysis found violations");
        Err(AnalysisReport { errors })
    }
}

/// Per-handler lexical scope: the triggering message's declared fields
/// (`None` means no schema was declared, so `msg`/`trigger.payload` access
/// is permissive) plus any `read.<alias>` bindings introduced so far.
struct Scope {
    msg_fields: Option<HashSet<String>>,
    read_vars: std::collections::HashMap<String, HashSet<String>>,
}

fn analyze_handler(
    blueprint: &Blueprint,
    component: &str,
    handler: &Handler,
    errors: &mut Vec<AnalyzerError>,
) {
    let msg_fields = blueprint
        .components
        .iter()
        .flat_map(|c| &c.message_schemas)
        .find(|s| s.message_name == handler.on_message)
        .map(|s| s.fields.iter().cloned().collect::<HashSet<_>>());

    let mut scope = Scope {
        msg_fields,
        read_vars: std::collections::HashMap::new(),
    };
    walk_steps(
        blueprint,
        component,
        &handler.on_message,
        &handler.logic,
        &mut scope,
        errors,
    );
}

fn walk_steps(
    blueprint: &Blueprint,
    component: &str,
    handler_name: &str,
    steps: &[Step],
    scope: &mut Scope,
    errors: &mut Vec<AnalyzerError>,
) {
    for step in steps {
        match step {
            Step::Read { table, as_, .. } => {
                if let Some(schema) = blueprint
                    .components
                    .iter()
                    .flat_map(|c| &c.tables)
                    .find(|t| &t.name == table)
                {
                    let columns = schema.columns.iter().map(|c| c.name.clone()).collect();
                    scope.read_vars.insert(as_.clone(), columns);
                }
            }
            Step::Create { data, .. } => {
                check_row(blueprint, component, handler_name, "create.data", data, scope, errors);
            }
            Step::Update { set, where_, .. } => {
                check_row(blueprint, component, handler_name, "update.set", set, scope, errors);
                check_row(blueprint, component, handler_name, "update.where", where_, scope, errors);
            }
            Step::Send { payload, .. } => {
                check_row(blueprint, component, handler_name, "send.payload", payload, scope, errors);
            }
            Step::Match { on, cases } => {
                check_raw_expr(component, handler_name, "match.on", on, scope, errors);
                for case in cases {
                    walk_case(blueprint, component, handler_name, case, scope, errors);
                }
            }
        }
    }
}

fn walk_case(
    blueprint: &Blueprint,
    component: &str,
    handler_name: &str,
    case: &MatchCase,
    scope: &Scope,
    errors: &mut Vec<AnalyzerError>,
) {
    // Each case's steps are analyzed against a snapshot of the scope as it
    // stood right before the match — only one case ever actually prepends
    // its steps at runtime, so bindings introduced by one case must not
    // leak into its siblings or past the match statement.
    let mut case_scope = Scope {
        msg_fields: scope.msg_fields.clone(),
        read_vars: scope.read_vars.clone(),
    };
    walk_steps(
        blueprint,
        component,
        handler_name,
        &case.steps,
        &mut case_scope,
        errors,
    );
}

fn check_row(
    _blueprint: &Blueprint,
    component: &str,
    handler_name: &str,
    location_prefix: &str,
    row: &Row,
    scope: &Scope,
    errors: &mut Vec<AnalyzerError>,
) {
    for (column, value) in row {
        if let weave_types::Value::Str(s) = value {
            let location = format!("{location_prefix}.{column}");
            check_expr_string(component, handler_name, &location, s, scope, errors);
        }
    }
}

/// Checks a bare (non-template) expression, such as `match`'s `on` field
/// (`spec.md` §4.5): unlike `{{…}}`-delimited template strings, the whole
/// source string is itself the expression to parse and scope-check.
fn check_raw_expr(
    component: &str,
    handler_name: &str,
    location: &str,
    source: &str,
    scope: &Scope,
    errors: &mut Vec<AnalyzerError>,
) {
    let ast = match weave_expr::parse_expr(source) {
        Ok(ast) => ast,
        Err(_) => {
            errors.push(AnalyzerError::SyntaxError {
                component: component.to_string(),
                handler: handler_name.to_string(),
                location: location.to_string(),
                expression: source.to_string(),
            });
            return;
        }
    };
    for path in ast.variable_paths() {
        if !is_variable_valid(&path, scope) {
            errors.push(AnalyzerError::OutOfScopeVariable {
                component: component.to_string(),
                handler: handler_name.to_string(),
                location: location.to_string(),
                expression: source.to_string(),
                variable: path.join("."),
            });
        }
    }
}

fn check_expr_string(
    component: &str,
    handler_name: &str,
    location: &str,
    source: &str,
    scope: &Scope,
    errors: &mut Vec<AnalyzerError>,
) {
    for inner in weave_expr::template_expressions(source) {
        let ast = match weave_expr::parse_expr(&inner) {
            Ok(ast) => ast,
            Err(_) => {
                errors.push(AnalyzerError::SyntaxError {
                    component: component.to_string(),
                    handler: handler_name.to_string(),
                    location: location.to_string(),
                    expression: source.to_string(),
                });
                continue;
            }
        };
        for path in ast.variable_paths() {
            if !is_variable_valid(&path, scope) {
                errors.push(AnalyzerError::OutOfScopeVariable {
                    component: component.to_string(),
                    handler: handler_name.to_string(),
                    location: location.to_string(),
                    expression: source.to_string(),
                    variable: path.join("."),
                });
            }
        }
    }
}

fn is_variable_valid(parts: &[String], scope: &Scope) -> bool {
    let Some(root) = parts.first() else {
        return false;
    };
    match root.as_str() {
        "msg" => {
            if parts.len() < 2 {
                return false;
            }
            match &scope.msg_fields {
                None => true,
                Some(fields) => fields.contains(&parts[1]),
            }
        }
        "trigger" => {
            if parts.len() < 2 {
                return false;
            }
            match parts[1].as_str() {
                "sender" | "message" | "timestamp" => true,
                "payload" => {
                    if parts.len() < 3 {
                        return false;
                    }
                    match &scope.msg_fields {
                        None => true,
                        Some(fields) => fields.contains(&parts[2]),
                    }
                }
                _ => false,
            }
        }
        "read" => {
            if parts.len() < 3 {
                return false;
            }
            scope
                .read_vars
                .get(&parts[1])
                .map(|cols| cols.contains(&parts[2]))
                .unwrap_or(false)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn blueprint_with_handler(logic: Vec<Step>, tables: Vec<TableSchema>) -> Blueprint {
        Blueprint {
            components: vec![Component {
                name: "A".into(),
                tables,
                handlers: vec![Handler {
                    on_message: "Set".into(),
                    logic,
                }],
                invariants: vec![],
                message_schemas: vec![],
            }],
            scenarios: vec![],
            test_invariants: vec![],
            run: RunConfig::default(),
        }
    }

    #[test]
    fn permissive_when_no_schema_declared() {
        let bp = blueprint_with_handler(
            vec![Step::Create {
                table: "t".into(),
                data: row(&[("v", Value::Str("{{ trigger.payload.v }}".into()))]),
            }],
            vec![],
        );
        assert!(analyze(&bp).is_ok());
    }

    #[test]
    fn read_alias_must_be_preceded_by_read_step() {
        let bp = blueprint_with_handler(
            vec![Step::Create {
                table: "t".into(),
                data: row(&[("v", Value::Str("{{ read.acct.balance }}".into()))]),
            }],
            vec![],
        );
        let report = analyze(&bp).unwrap_err();
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            &report.errors[0],
            AnalyzerError::OutOfScopeVariable { variable, .. } if variable == "read.acct.balance"
        ));
    }

    #[test]
    fn read_alias_in_scope_after_preceding_read() {
        let bp = blueprint_with_handler(
            vec![
                Step::Read {
                    table: "account".into(),
                    where_: None,
                    key: None,
                    as_: "acct".into(),
                },
                Step::Create {
                    table: "t".into(),
                    data: row(&[("v", Value::Str("{{ read.acct.balance }}".into()))]),
                },
            ],
            vec![TableSchema {
                name: "account".into(),
                columns: vec![ColumnDef {
                    name: "balance".into(),
                    ty: PrimitiveType::Int,
                    primary_key: false,
                    not_null: false,
                }],
            }],
        );
        assert!(analyze(&bp).is_ok());
    }

    #[test]
    fn syntax_error_is_reported() {
        let bp = blueprint_with_handler(
            vec![Step::Create {
                table: "t".into(),
                data: row(&[("v", Value::Str("{{ 1 + }}".into()))]),
            }],
            vec![],
        );
        let report = analyze(&bp).unwrap_err();
        assert!(matches!(report.errors[0], AnalyzerError::SyntaxError { .. }));
    }

    #[test]
    fn match_case_bindings_do_not_leak_to_siblings() {
        let bp = blueprint_with_handler(
            vec![Step::Match {
                on: "trigger.payload.kind".into(),
                cases: vec![
                    MatchCase {
                        when: Some(Value::Str("a".into())),
                        steps: vec![
                            Step::Read {
                                table: "account".into(),
                                where_: None,
                                key: None,
                                as_: "acct".into(),
                            },
                        ],
                    },
                    MatchCase {
                        when: None,
                        steps: vec![Step::Create {
                            table: "t".into(),
                            data: row(&[("v", Value::Str("{{ read.acct.balance }}".into()))]),
                        }],
                    },
                ],
            }],
            vec![TableSchema {
                name: "account".into(),
                columns: vec![ColumnDef {
                    name: "balance".into(),
                    ty: PrimitiveType::Int,
                    primary_key: false,
                    not_null: false,
                }],
            }],
        );
        let report = analyze(&bp).unwrap_err();
        assert_eq!(report.errors.len(), 1);
    }
}
