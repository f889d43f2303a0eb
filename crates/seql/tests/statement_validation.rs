#![allow(dead_code)]

mod common;

use common::{MockRunner, company_table, customer_table};
use seql::{DbValue, Dialect, QueryError, Table, ValueKind};

#[test]
fn where_is_required_for_update() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let err = conn
        .update(&customer)
        .set("first_name", "Bob")
        .compile()
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[test]
fn all_rows_allows_an_unfiltered_update() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .update(&customer)
        .set("first_name", "Bob")
        .all_rows()
        .compile()
        .unwrap();
    assert_eq!(compiled.sql, "UPDATE customer SET first_name = $1");
}

#[test]
fn where_is_required_for_delete() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let err = conn.delete_from(&customer).compile().unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));

    let compiled = conn
        .delete_from(&customer)
        .where_(customer.col("id").equals(1))
        .compile()
        .unwrap();
    assert_eq!(compiled.sql, "DELETE FROM customer WHERE (id = $1)");
}

#[test]
fn foreign_table_reference_is_out_of_scope() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table();
    let err = conn
        .select_from(&customer)
        .where_(company.col("id").equals(1))
        .select(vec![("id", customer.col("id"))])
        .compile()
        .unwrap_err();
    match err {
        QueryError::TableNotInScope { table } => assert_eq!(table, "company"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unknown_column_poisons_the_statement() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let err = conn
        .select_from(&customer)
        .where_(customer.col("nope").equals(1))
        .select(vec![("id", customer.col("id"))])
        .compile()
        .unwrap_err();
    match err {
        QueryError::Composition(message) => assert!(message.contains("nope")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn kind_mismatch_poisons_the_comparison() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let err = conn
        .select_from(&customer)
        .where_(customer.col("first_name").equals(42))
        .select(vec![("id", customer.col("id"))])
        .compile()
        .unwrap_err();
    assert!(err.is_composition());
}

#[test]
fn group_by_must_name_a_projected_result() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let err = conn
        .select_from(&customer)
        .select(vec![("id", customer.col("id"))])
        .group_by(&["nope"])
        .compile()
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[test]
fn order_by_must_name_a_projected_result() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let err = conn
        .select_from(&customer)
        .select(vec![("id", customer.col("id"))])
        .order_by("nope", seql::OrderByMode::Asc)
        .compile()
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[test]
fn basic_insert() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .insert_into(&customer)
        .set("first_name", "John")
        .set("last_name", "Smith")
        .set("company_id", 1)
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "INSERT INTO customer (first_name, last_name, company_id) VALUES ($1, $2, $3)"
    );
    assert_eq!(
        compiled.params,
        vec![
            DbValue::Text("John".into()),
            DbValue::Text("Smith".into()),
            DbValue::Int(1),
        ]
    );
}

#[test]
fn multi_row_insert() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let company = company_table();
    let compiled = conn
        .insert_into(&company)
        .set("name", "acme")
        .next_row()
        .set("name", "globex")
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "INSERT INTO company (name) VALUES ($1), ($2)"
    );
}

#[test]
fn multi_row_insert_rejects_diverging_columns() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let err = conn
        .insert_into(&customer)
        .set("first_name", "John")
        .set("last_name", "Smith")
        .set("company_id", 1)
        .next_row()
        .set("first_name", "Jane")
        .compile()
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[test]
fn insert_must_cover_required_columns() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let err = conn
        .insert_into(&customer)
        .set("first_name", "John")
        .compile()
        .unwrap_err();
    match err {
        QueryError::Validation(message) => assert!(message.contains("last_name")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn optional_value_cannot_fill_a_required_column() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let err = conn
        .insert_into(&customer)
        .set("first_name", "John")
        .set("last_name", "Smith")
        .set(
            "company_id",
            conn.optional_const_value(None::<i64>, ValueKind::Int),
        )
        .compile()
        .unwrap_err();
    assert!(err.is_composition());
}

#[test]
fn set_if_value_skips_absent_columns() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .insert_into(&customer)
        .set("first_name", "John")
        .set("last_name", "Smith")
        .set("company_id", 1)
        .set_if_value("birthday", None::<chrono::NaiveDate>)
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "INSERT INTO customer (first_name, last_name, company_id) VALUES ($1, $2, $3)"
    );
}

#[test]
fn insert_from_select() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let target = company_table();
    let source = company_table();
    let compiled = conn
        .insert_into(&target)
        .from_select(
            conn.select_from(&source)
                .where_(source.col("parent_id").is_null())
                .select(vec![("name", source.col("name"))]),
        )
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "INSERT INTO company (name) \
         SELECT company.name AS name FROM company WHERE (company.parent_id IS NULL)"
    );
}

#[test]
fn sequence_key_is_filled_in_when_omitted() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let log = Table::create("event_log")
        .primary_key_from_sequence("id", ValueKind::Int, "event_log_seq")
        .column("message", ValueKind::String)
        .build()
        .unwrap();
    let compiled = conn
        .insert_into(&log)
        .set("message", "started")
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "INSERT INTO event_log (message, id) VALUES ($1, nextval('event_log_seq'))"
    );
}

#[test]
fn default_values_per_dialect() {
    let settings = Table::create("settings")
        .autogenerated_primary_key("id", ValueKind::Int)
        .optional_column("note", ValueKind::String)
        .build()
        .unwrap();

    let pg = MockRunner::new(Dialect::PostgreSql).connection();
    let compiled = pg.insert_into(&settings).default_values().compile().unwrap();
    assert_eq!(compiled.sql, "INSERT INTO settings DEFAULT VALUES");

    let mysql = MockRunner::new(Dialect::MySql).connection();
    let compiled = mysql
        .insert_into(&settings)
        .default_values()
        .compile()
        .unwrap();
    assert_eq!(compiled.sql, "INSERT INTO settings () VALUES ()");

    let oracle = MockRunner::new(Dialect::Oracle).connection();
    let err = oracle
        .insert_into(&settings)
        .default_values()
        .compile()
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn views_are_not_writable() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let view = Table::create_view("active_customer")
        .column("id", ValueKind::Int)
        .build()
        .unwrap();
    assert!(conn.insert_into(&view).set("id", 1).compile().is_err());
    assert!(
        conn.update(&view)
            .set("id", 1)
            .all_rows()
            .compile()
            .is_err()
    );
    assert!(conn.delete_from(&view).all_rows().compile().is_err());
}

#[test]
fn update_returning_on_postgres() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .update(&customer)
        .set("first_name", "Bob")
        .where_(customer.col("id").equals(2))
        .returning(vec![("name", customer.col("first_name"))])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "UPDATE customer SET first_name = $1 WHERE (id = $2) \
         RETURNING first_name AS name"
    );
}

#[test]
fn old_values_compile_to_output_on_sql_server() {
    let conn = MockRunner::new(Dialect::SqlServer).connection();
    let customer = customer_table();
    let old = customer.old_values();
    let compiled = conn
        .update(&customer)
        .set("first_name", "Bob")
        .where_(customer.col("id").equals(2))
        .returning(vec![
            ("old_name", old.col("first_name")),
            ("new_name", customer.col("first_name")),
        ])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "UPDATE customer SET first_name = @p1 \
         OUTPUT DELETED.first_name AS old_name, INSERTED.first_name AS new_name \
         WHERE (id = @p2)"
    );
}

#[test]
fn old_values_are_rejected_where_unsupported() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let old = customer.old_values();
    let err = conn
        .update(&customer)
        .set("first_name", "Bob")
        .where_(customer.col("id").equals(2))
        .returning(vec![("old_name", old.col("first_name"))])
        .compile()
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn delete_returning_uses_the_pre_change_image_on_sql_server() {
    let conn = MockRunner::new(Dialect::SqlServer).connection();
    let customer = customer_table();
    let compiled = conn
        .delete_from(&customer)
        .where_(customer.col("id").equals(9))
        .returning(vec![("name", customer.col("first_name"))])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "DELETE FROM customer OUTPUT DELETED.first_name AS name WHERE (id = @p1)"
    );
}

#[test]
fn update_set_rejects_unknown_and_duplicate_columns() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    assert!(
        conn.update(&customer)
            .set("nope", 1)
            .all_rows()
            .compile()
            .is_err()
    );
    assert!(
        conn.update(&customer)
            .set("first_name", "a")
            .set("first_name", "b")
            .all_rows()
            .compile()
            .is_err()
    );
}

#[test]
fn update_filter_composes_with_or() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .update(&customer)
        .set("first_name", "Bob")
        .where_(customer.col("id").equals(1))
        .or(customer.col("id").equals(2))
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "UPDATE customer SET first_name = $1 WHERE ((id = $2) OR (id = $3))"
    );
}

#[test]
fn delete_filter_composes_with_and() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .delete_from(&customer)
        .where_(customer.col("id").equals(1))
        .and(customer.col("first_name").equals("Bob"))
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "DELETE FROM customer WHERE ((id = $1) AND (first_name = $2))"
    );
}

#[test]
fn update_from_reads_another_table() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table();
    let compiled = conn
        .update(&customer)
        .set("first_name", company.col("name"))
        .from(&company)
        .where_(customer.col("company_id").equals(company.col("id")))
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "UPDATE customer SET first_name = company.name FROM company \
         WHERE (customer.company_id = company.id)"
    );
}

#[test]
fn update_from_uses_the_multi_table_form_on_mysql() {
    let conn = MockRunner::new(Dialect::MySql).connection();
    let customer = customer_table();
    let company = company_table();
    let compiled = conn
        .update(&customer)
        .set("first_name", company.col("name"))
        .from(&company)
        .where_(customer.col("company_id").equals(company.col("id")))
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "UPDATE customer, company SET customer.first_name = company.name \
         WHERE (customer.company_id = company.id)"
    );
}

#[test]
fn update_from_is_rejected_on_oracle() {
    let conn = MockRunner::new(Dialect::Oracle).connection();
    let customer = customer_table();
    let company = company_table();
    let err = conn
        .update(&customer)
        .set("first_name", company.col("name"))
        .from(&company)
        .where_(customer.col("company_id").equals(company.col("id")))
        .compile()
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn update_set_without_from_may_not_reach_another_table() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table();
    let err = conn
        .update(&customer)
        .set("first_name", company.col("name"))
        .where_(customer.col("id").equals(1))
        .compile()
        .unwrap_err();
    assert!(matches!(err, QueryError::TableNotInScope { .. }));
}

#[test]
fn delete_using_filters_against_another_table() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table();
    let compiled = conn
        .delete_from(&customer)
        .using(&company)
        .where_(customer.col("company_id").equals(company.col("id")))
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "DELETE FROM customer USING company \
         WHERE (customer.company_id = company.id)"
    );
}

#[test]
fn delete_using_lists_the_target_on_mysql() {
    let conn = MockRunner::new(Dialect::MySql).connection();
    let customer = customer_table();
    let company = company_table();
    let compiled = conn
        .delete_from(&customer)
        .using(&company)
        .where_(customer.col("company_id").equals(company.col("id")))
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "DELETE FROM customer USING customer, company \
         WHERE (customer.company_id = company.id)"
    );
}

#[test]
fn delete_using_is_rejected_on_sqlite() {
    let conn = MockRunner::new(Dialect::Sqlite).connection();
    let customer = customer_table();
    let company = company_table();
    let err = conn
        .delete_from(&customer)
        .using(&company)
        .where_(customer.col("company_id").equals(company.col("id")))
        .compile()
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn update_may_reference_its_own_columns() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .update(&customer)
        .set("first_name", customer.col("last_name"))
        .where_(customer.col("id").equals(3))
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "UPDATE customer SET first_name = last_name WHERE (id = $1)"
    );
}
