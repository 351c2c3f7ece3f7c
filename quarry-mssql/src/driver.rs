use crate::{MssqlConnection, MssqlSqlWriter};
use quarry_core::Driver;

#[derive(Default, Debug, Clone, Copy)]
pub struct MssqlDriver {}

impl MssqlDriver {
    pub const fn new() -> Self {
        Self {}
    }
}

impl Driver for MssqlDriver {
    type Connection = MssqlConnection;
    type SqlWriter = MssqlSqlWriter;

    const NAME: &'static str = "mssql";

    fn sql_writer(&self) -> MssqlSqlWriter {
        MssqlSqlWriter {}
    }
}
