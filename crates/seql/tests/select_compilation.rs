#![allow(dead_code)]

mod common;

use common::{MockRunner, company_table, customer_table};
use seql::{DbValue, Dialect, OrderByMode, QueryError, aggregate_as_array, count_all};

#[test]
fn basic_select_with_where() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .where_(customer.col("first_name").equals("John"))
        .select(vec![
            ("id", customer.col("id")),
            ("name", customer.col("first_name")),
        ])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.id AS id, customer.first_name AS name \
         FROM customer WHERE (customer.first_name = $1)"
    );
    assert_eq!(compiled.params, vec![DbValue::Text("John".into())]);
}

#[test]
fn compilation_is_deterministic() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let query = conn
        .select_from(&customer)
        .where_(customer.col("company_id").equals(7))
        .select(vec![("id", customer.col("id"))]);
    let first = query.compile().unwrap();
    let second = query.compile().unwrap();
    assert_eq!(first, second);
}

#[test]
fn inner_join() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table();
    let compiled = conn
        .select_from(&customer)
        .join(&company)
        .on(customer.col("company_id").equals(company.col("id")))
        .select(vec![
            ("id", customer.col("id")),
            ("company", company.col("name")),
        ])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.id AS id, company.name AS company \
         FROM customer INNER JOIN company ON (customer.company_id = company.id)"
    );
    assert!(compiled.params.is_empty());
}

#[test]
fn left_join_with_aliased_derivation() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table().for_use_in_left_join_as("c").unwrap();
    let compiled = conn
        .select_from(&customer)
        .left_join(&company)
        .on(customer.col("company_id").equals(company.col("id")))
        .select(vec![
            ("id", customer.col("id")),
            ("company", company.col("name")),
        ])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.id AS id, c.name AS company \
         FROM customer LEFT JOIN company AS c ON (customer.company_id = c.id)"
    );
}

#[test]
fn self_join_through_alias() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let company = company_table();
    let parent = company.as_alias("parent").unwrap();
    let compiled = conn
        .select_from(&company)
        .join(&parent)
        .on(company.col("parent_id").equals(parent.col("id")))
        .select(vec![
            ("name", company.col("name")),
            ("parent_name", parent.col("name")),
        ])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT company.name AS name, parent.name AS parent_name \
         FROM company INNER JOIN company AS parent ON (company.parent_id = parent.id)"
    );
}

#[test]
fn mixed_projection_requires_an_explicit_group_by() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let err = conn
        .select_from(&customer)
        .select(vec![
            ("company_id", customer.col("company_id")),
            ("n", count_all()),
        ])
        .compile()
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[test]
fn explicit_group_by_with_having() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .select(vec![
            ("company_id", customer.col("company_id")),
            ("n", count_all()),
        ])
        .group_by(&["company_id"])
        .having(count_all().larger(2))
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.company_id AS company_id, COUNT(*) AS n \
         FROM customer GROUP BY customer.company_id HAVING (COUNT(*) > $1)"
    );
    assert_eq!(compiled.params, vec![DbValue::Int(2)]);
}

#[test]
fn order_by_with_native_nulls_placement() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .select(vec![("birthday", customer.col("birthday"))])
        .order_by("birthday", OrderByMode::AscNullsFirst)
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.birthday AS birthday FROM customer \
         ORDER BY birthday ASC NULLS FIRST"
    );
}

#[test]
fn order_by_emulates_nulls_placement_on_mysql() {
    let conn = MockRunner::new(Dialect::MySql).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .select(vec![("birthday", customer.col("birthday"))])
        .order_by("birthday", OrderByMode::AscNullsFirst)
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.birthday AS birthday FROM customer \
         ORDER BY CASE WHEN customer.birthday IS NULL THEN 0 ELSE 1 END, birthday ASC"
    );
}

#[test]
fn case_insensitive_ordering_folds_the_projected_expression() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .select(vec![("name", customer.col("first_name"))])
        .order_by("name", OrderByMode::DescInsensitive)
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.first_name AS name FROM customer \
         ORDER BY LOWER(customer.first_name) DESC"
    );
}

#[test]
fn limit_offset_postgres() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .select(vec![("id", customer.col("id"))])
        .order_by("id", OrderByMode::Asc)
        .limit(10)
        .offset(20)
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.id AS id FROM customer ORDER BY id ASC LIMIT 10 OFFSET 20"
    );
}

#[test]
fn limit_offset_sql_server() {
    let conn = MockRunner::new(Dialect::SqlServer).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .select(vec![("id", customer.col("id"))])
        .order_by("id", OrderByMode::Asc)
        .limit(10)
        .offset(20)
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.id AS id FROM customer ORDER BY id ASC \
         OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
    );
}

#[test]
fn sql_server_numbers_parameters() {
    let conn = MockRunner::new(Dialect::SqlServer).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .where_(
            customer
                .col("first_name")
                .equals("a")
                .and(customer.col("company_id").equals(3)),
        )
        .select(vec![("id", customer.col("id"))])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.id AS id FROM customer \
         WHERE ((customer.first_name = @p1) AND (customer.company_id = @p2))"
    );
}

#[test]
fn select_without_from() {
    let pg = MockRunner::new(Dialect::PostgreSql).connection();
    let compiled = pg
        .select_from_no_table()
        .select_one_column(pg.const_value(1))
        .compile()
        .unwrap();
    assert_eq!(compiled.sql, "SELECT $1 AS result");

    let oracle = MockRunner::new(Dialect::Oracle).connection();
    let compiled = oracle
        .select_from_no_table()
        .select_one_column(oracle.const_value(1))
        .compile()
        .unwrap();
    assert_eq!(compiled.sql, "SELECT :1 AS result FROM dual");
}

#[test]
fn union_all_keeps_leg_order() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table();
    let names = conn
        .select_from(&customer)
        .select(vec![("name", customer.col("first_name"))]);
    let compiled = names
        .union_all(
            conn.select_from(&company)
                .select(vec![("name", company.col("name"))]),
        )
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.first_name AS name FROM customer \
         UNION ALL SELECT company.name AS name FROM company"
    );
}

#[test]
fn with_view_emits_its_cte() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table();
    let stats = conn
        .select_from(&customer)
        .select(vec![
            ("company_id", customer.col("company_id")),
            ("n", count_all()),
        ])
        .group_by(&["company_id"])
        .for_use_in_query_as("customer_count")
        .unwrap();
    let compiled = conn
        .select_from(&company)
        .join(&stats)
        .on(company.col("id").equals(stats.col("company_id")))
        .select(vec![
            ("name", company.col("name")),
            ("n", stats.col("n")),
        ])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "WITH customer_count AS (\
         SELECT customer.company_id AS company_id, COUNT(*) AS n \
         FROM customer GROUP BY customer.company_id) \
         SELECT company.name AS name, customer_count.n AS n \
         FROM company INNER JOIN customer_count ON (company.id = customer_count.company_id)"
    );
}

#[test]
fn recursive_union_all_walks_the_hierarchy() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let company = company_table();
    let compiled = conn
        .select_from(&company)
        .where_(company.col("parent_id").is_null())
        .select(vec![
            ("id", company.col("id")),
            ("parent_id", company.col("parent_id")),
        ])
        .recursive_union_all_on(|roots| company.col("parent_id").equals(roots.col("id")))
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "WITH RECURSIVE recursive_select_1(id, parent_id) AS (\
         SELECT company.id AS id, company.parent_id AS parent_id \
         FROM company WHERE (company.parent_id IS NULL) \
         UNION ALL \
         SELECT company.id AS id, company.parent_id AS parent_id \
         FROM company INNER JOIN recursive_select_1 \
         ON (company.parent_id = recursive_select_1.id)) \
         SELECT id, parent_id FROM recursive_select_1"
    );
}

#[test]
fn mariadb_rejects_correlated_recursion() {
    let conn = MockRunner::new(Dialect::MariaDb).connection();
    let outer = company_table();
    let inner = company_table();
    let err = conn
        .sub_select_using(&[&outer])
        .from(&inner)
        .where_(inner.col("id").equals(outer.col("id")))
        .select(vec![
            ("id", inner.col("id")),
            ("parent_id", inner.col("parent_id")),
        ])
        .recursive_union_all_on(|found| inner.col("parent_id").equals(found.col("id")))
        .compile()
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn inline_query_value_correlates_with_the_enclosing_statement() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table();
    let customers = conn
        .sub_select_using(&[&company])
        .from(&customer)
        .where_(customer.col("company_id").equals(company.col("id")))
        .select_one_column(count_all())
        .for_use_as_inline_query_value();
    let compiled = conn
        .select_from(&company)
        .select(vec![
            ("name", company.col("name")),
            ("customers", customers),
        ])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT company.name AS name, (\
         SELECT COUNT(*) AS result FROM customer \
         WHERE (customer.company_id = company.id)) AS customers \
         FROM company"
    );
}

#[test]
fn exists_value_as_a_filter() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table();
    let has_customers = conn
        .sub_select_using(&[&company])
        .from(&customer)
        .where_(customer.col("company_id").equals(company.col("id")))
        .select_one_column(customer.col("id"))
        .for_use_as_exists_value();
    let compiled = conn
        .select_from(&company)
        .where_(has_customers)
        .select(vec![("name", company.col("name"))])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT company.name AS name FROM company \
         WHERE EXISTS (SELECT customer.id AS result FROM customer \
         WHERE (customer.company_id = company.id))"
    );
}

#[test]
fn inline_aggregated_array_builds_json() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let company = company_table();
    let customers = conn
        .sub_select_using(&[&company])
        .from(&customer)
        .where_(customer.col("company_id").equals(company.col("id")))
        .select(vec![
            ("id", customer.col("id")),
            ("name", customer.col("first_name")),
        ])
        .for_use_as_inline_aggregated_array_value()
        .use_empty_array_for_no_value();
    let compiled = conn
        .select_from(&company)
        .select(vec![
            ("name", company.col("name")),
            ("customers", customers),
        ])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT company.name AS name, (\
         SELECT COALESCE(json_agg(json_build_object(\
         'id', inline_agg_source.id, 'name', inline_agg_source.name)), '[]'::json) \
         FROM (SELECT customer.id AS id, customer.first_name AS name \
         FROM customer WHERE (customer.company_id = company.id)) AS inline_agg_source) \
         AS customers FROM company"
    );
}

#[test]
fn inline_aggregated_array_is_rejected_on_sql_server() {
    let conn = MockRunner::new(Dialect::SqlServer).connection();
    let customer = customer_table();
    let company = company_table();
    let customers = conn
        .sub_select_using(&[&company])
        .from(&customer)
        .where_(customer.col("company_id").equals(company.col("id")))
        .select(vec![("id", customer.col("id"))])
        .for_use_as_inline_aggregated_array_value();
    let err = conn
        .select_from(&company)
        .select(vec![
            ("name", company.col("name")),
            ("customers", customers),
        ])
        .compile()
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn optional_filters_disappear_when_absent() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let name_filter: Option<&str> = None;
    let compiled = conn
        .select_from(&customer)
        .where_(customer.col("first_name").starts_with_if_value(name_filter))
        .where_(customer.col("company_id").equals(5))
        .select(vec![("id", customer.col("id"))])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.id AS id FROM customer WHERE (customer.company_id = $1)"
    );
    assert_eq!(compiled.params, vec![DbValue::Int(5)]);
}

#[test]
fn not_in_if_value_disappears_when_absent() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .where_(customer.col("id").not_in_if_value(None::<Vec<i64>>))
        .select(vec![("id", customer.col("id"))])
        .compile()
        .unwrap();
    assert_eq!(compiled.sql, "SELECT customer.id AS id FROM customer");

    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let compiled = conn
        .select_from(&customer)
        .where_(customer.col("id").not_in_if_value(Some(vec![1i64, 2])))
        .select(vec![("id", customer.col("id"))])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.id AS id FROM customer WHERE (customer.id NOT IN ($1, $2))"
    );
}

#[test]
fn or_composes_filters_on_the_builder() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .where_(customer.col("first_name").equals("John"))
        .or(customer.col("last_name").equals("Smith"))
        .select(vec![("id", customer.col("id"))])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customer.id AS id FROM customer \
         WHERE ((customer.first_name = $1) OR (customer.last_name = $2))"
    );
}

#[test]
fn aggregate_array_escapes_quoted_result_names() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .select(vec![(
            "names",
            aggregate_as_array(vec![("it's", customer.col("first_name"))]),
        )])
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT json_agg(json_build_object('it''s', customer.first_name)) AS names \
         FROM customer"
    );
}

#[test]
fn distinct_projection() {
    let conn = MockRunner::new(Dialect::PostgreSql).connection();
    let customer = customer_table();
    let compiled = conn
        .select_from(&customer)
        .select(vec![("company_id", customer.col("company_id"))])
        .distinct()
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT DISTINCT customer.company_id AS company_id FROM customer"
    );
}
