#![allow(dead_code)]

use async_trait::async_trait;
use seql::{Connection, DbValue, Dialect, QueryResult, QueryRunner, Row, Table, ValueKind};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// In-memory runner that records every executed statement and replays
/// queued result sets in order.
pub struct MockRunner {
    dialect: Dialect,
    executed: Mutex<Vec<(String, Vec<DbValue>)>>,
    responses: Mutex<VecDeque<Vec<Row>>>,
    affected: u64,
    tx_log: Mutex<Vec<&'static str>>,
}

impl MockRunner {
    pub fn new(dialect: Dialect) -> Arc<Self> {
        Arc::new(Self {
            dialect,
            executed: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            affected: 1,
            tx_log: Mutex::new(Vec::new()),
        })
    }

    pub fn with_affected(dialect: Dialect, affected: u64) -> Arc<Self> {
        Arc::new(Self {
            dialect,
            executed: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            affected,
            tx_log: Mutex::new(Vec::new()),
        })
    }

    pub fn connection(self: &Arc<Self>) -> Connection {
        Connection::new(self.clone())
    }

    /// Queue the result set the next select-like statement returns.
    pub fn queue(&self, rows: Vec<Row>) {
        self.responses.lock().unwrap().push_back(rows);
    }

    pub fn executed(&self) -> Vec<(String, Vec<DbValue>)> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed().into_iter().map(|(sql, _)| sql).collect()
    }

    pub fn tx_events(&self) -> Vec<&'static str> {
        self.tx_log.lock().unwrap().clone()
    }

    fn record(&self, sql: &str, params: &[DbValue]) {
        self.executed
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
    }
}

#[async_trait]
impl QueryRunner for MockRunner {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute_select_many_rows(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> QueryResult<Vec<Row>> {
        self.record(sql, params);
        Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn execute_mutation(&self, sql: &str, params: &[DbValue]) -> QueryResult<u64> {
        self.record(sql, params);
        Ok(self.affected)
    }

    async fn execute_begin_transaction(&self) -> QueryResult<()> {
        self.tx_log.lock().unwrap().push("begin");
        Ok(())
    }

    async fn execute_commit(&self) -> QueryResult<()> {
        self.tx_log.lock().unwrap().push("commit");
        Ok(())
    }

    async fn execute_rollback(&self) -> QueryResult<()> {
        self.tx_log.lock().unwrap().push("rollback");
        Ok(())
    }
}

/// `customer(id, first_name, last_name, birthday?, company_id)`
pub fn customer_table() -> Table {
    Table::create("customer")
        .autogenerated_primary_key("id", ValueKind::Int)
        .column("first_name", ValueKind::String)
        .column("last_name", ValueKind::String)
        .optional_column("birthday", ValueKind::LocalDate)
        .column("company_id", ValueKind::Int)
        .build()
        .unwrap()
}

/// `company(id, name, parent_id?)`
pub fn company_table() -> Table {
    Table::create("company")
        .autogenerated_primary_key("id", ValueKind::Int)
        .column("name", ValueKind::String)
        .optional_column("parent_id", ValueKind::Int)
        .build()
        .unwrap()
}
