use arrow_schema::DataType;
use qx_common::QxError;
use qx_planner::{
    sql_frontend, ColumnField, InMemoryCatalog, Literal, RelNode, RowType, ScalarExpr,
};

fn test_catalog() -> InMemoryCatalog {
    let mut cat = InMemoryCatalog::new();
    cat.register_table(
        "sales",
        RowType::new(vec![
            ColumnField::new("region", DataType::Utf8, false),
            ColumnField::new("amount", DataType::Float64, true),
            ColumnField::new("qty", DataType::Int64, false),
            ColumnField::new("cust_id", DataType::Int64, false),
        ]),
    );
    cat.register_table(
        "customers",
        RowType::new(vec![
            ColumnField::new("cust_id", DataType::Int64, false),
            ColumnField::new("name", DataType::Utf8, false),
        ]),
    );
    // fully column-masked table: visible schema is empty
    cat.register_table("masked", RowType::default());
    cat
}

#[test]
fn select_constant_builds_values_based_plan() {
    let cat = test_catalog();
    let (plan, row_type) = sql_frontend::parse("SELECT 1", &[], &cat).expect("parse");

    assert!(!plan.contains_scan());
    assert_eq!(row_type.fields().len(), 1);
    assert_eq!(row_type.fields()[0].data_type, DataType::Int64);
    match plan.as_ref() {
        RelNode::Project { exprs, input } => {
            assert_eq!(exprs.len(), 1);
            assert!(matches!(
                &exprs[0].0,
                ScalarExpr::Literal(Literal::Int64(1))
            ));
            assert!(matches!(input.as_ref(), RelNode::Values { rows, .. } if rows.len() == 1));
        }
        other => panic!("expected projection root, got {other:?}"),
    }

    let encoded = plan.to_json().expect("plan encodes");
    assert!(encoded.contains("Project"), "got: {encoded}");
}

#[test]
fn positional_params_bind_sequential_and_explicit() {
    let cat = test_catalog();
    let params = vec![Literal::Utf8("west".to_string()), Literal::Int64(7)];

    let (plan, _) =
        sql_frontend::parse("SELECT ?, ?", &params, &cat).expect("sequential placeholders");
    match plan.as_ref() {
        RelNode::Project { exprs, .. } => {
            assert!(matches!(&exprs[0].0, ScalarExpr::Literal(Literal::Utf8(s)) if s == "west"));
            assert!(matches!(&exprs[1].0, ScalarExpr::Literal(Literal::Int64(7))));
        }
        other => panic!("expected projection root, got {other:?}"),
    }

    let (plan, _) =
        sql_frontend::parse("SELECT $2, $1", &params, &cat).expect("explicit placeholders");
    match plan.as_ref() {
        RelNode::Project { exprs, .. } => {
            assert!(matches!(&exprs[0].0, ScalarExpr::Literal(Literal::Int64(7))));
            assert!(matches!(&exprs[1].0, ScalarExpr::Literal(Literal::Utf8(s)) if s == "west"));
        }
        other => panic!("expected projection root, got {other:?}"),
    }
}

#[test]
fn missing_positional_param_is_a_parse_error() {
    let cat = test_catalog();
    let err = sql_frontend::parse("SELECT ?", &[], &cat).unwrap_err();
    assert!(matches!(err, QxError::Parse(_)), "got {err:?}");
}

#[test]
fn wildcard_expands_from_catalog_schema() {
    let cat = test_catalog();
    let (plan, row_type) = sql_frontend::parse("SELECT * FROM sales", &[], &cat).expect("parse");

    assert!(plan.contains_scan());
    assert_eq!(
        row_type.column_names(),
        vec!["region", "amount", "qty", "cust_id"]
    );
}

#[test]
fn wildcard_over_masked_table_expands_to_zero_columns() {
    let cat = test_catalog();
    let (_, row_type) = sql_frontend::parse("SELECT * FROM masked", &[], &cat).expect("parse");
    assert!(row_type.is_empty());
}

#[test]
fn unknown_column_and_table_are_parse_errors() {
    let cat = test_catalog();

    let err = sql_frontend::parse("SELECT nope FROM sales", &[], &cat).unwrap_err();
    match err {
        QxError::Parse(msg) => assert!(msg.contains("'nope'"), "got: {msg}"),
        other => panic!("expected parse error, got {other:?}"),
    }

    let err = sql_frontend::parse("SELECT 1 FROM no_such_table", &[], &cat).unwrap_err();
    match err {
        QxError::Parse(msg) => assert!(msg.contains("'no_such_table'"), "got: {msg}"),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn count_distinct_is_detected() {
    let cat = test_catalog();
    let (plan, _) =
        sql_frontend::parse("SELECT COUNT(DISTINCT region) AS c FROM sales", &[], &cat)
            .expect("parse");

    let agg = match plan.as_ref() {
        RelNode::Project { input, .. } => input,
        other => panic!("expected projection root, got {other:?}"),
    };
    match agg.as_ref() {
        RelNode::Aggregate { agg_calls, .. } => {
            assert_eq!(agg_calls.len(), 1);
            assert_eq!(agg_calls[0].func, "COUNT");
            assert!(agg_calls[0].distinct);
            assert_eq!(agg_calls[0].name, "c");
        }
        other => panic!("expected aggregate below projection, got {other:?}"),
    }
}

#[test]
fn group_by_with_filter_and_limit_assembles_in_order() {
    let cat = test_catalog();
    let (plan, row_type) = sql_frontend::parse(
        "SELECT region, SUM(amount) AS total FROM sales WHERE qty > 0 GROUP BY region LIMIT 10",
        &[],
        &cat,
    )
    .expect("parse");

    assert_eq!(row_type.column_names(), vec!["region", "total"]);
    let project = match plan.as_ref() {
        RelNode::Limit { n, input } => {
            assert_eq!(*n, 10);
            input
        }
        other => panic!("expected limit root, got {other:?}"),
    };
    let agg = match project.as_ref() {
        RelNode::Project { input, .. } => input,
        other => panic!("expected projection, got {other:?}"),
    };
    match agg.as_ref() {
        RelNode::Aggregate {
            group_exprs, input, ..
        } => {
            assert_eq!(group_exprs.len(), 1);
            assert!(matches!(input.as_ref(), RelNode::Filter { .. }));
        }
        other => panic!("expected aggregate, got {other:?}"),
    }
}

#[test]
fn inner_join_extracts_equi_pairs() {
    let cat = test_catalog();
    let (plan, _) = sql_frontend::parse(
        "SELECT name FROM sales JOIN customers ON sales.cust_id = customers.cust_id",
        &[],
        &cat,
    )
    .expect("parse");

    fn find_join(node: &RelNode) -> Option<(Vec<(String, String)>, qx_planner::JoinType)> {
        if let RelNode::Join { on, join_type, .. } = node {
            return Some((on.clone(), *join_type));
        }
        node.inputs().iter().find_map(|i| find_join(i))
    }
    let (on, jt) = find_join(&plan).expect("join in plan");
    assert_eq!(jt, qx_planner::JoinType::Inner);
    assert_eq!(on.len(), 1);
    assert_eq!(on[0].0, "sales.cust_id");
    assert_eq!(on[0].1, "customers.cust_id");
}

#[test]
fn non_select_statements_are_unsupported() {
    let cat = test_catalog();
    let err = sql_frontend::parse("INSERT INTO sales VALUES (1)", &[], &cat).unwrap_err();
    assert!(matches!(err, QxError::Unsupported(_)), "got {err:?}");
}
