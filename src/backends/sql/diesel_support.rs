//! Pieces shared by the diesel-async engines.

use super::{SqlParam, StoredRow};
use diesel::backend::Backend;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::serialize::ToSql;
use diesel::sql_types::{BigInt, Binary, HasSqlType, Text};
use diesel::QueryableByName;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

/// Characters escaped in connection URL components (everything but
/// unreserved).
pub(crate) const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Builds a raw query with `params` bound in order.
pub(crate) fn bind_all<'f, DB>(sql: &str, params: Vec<SqlParam>) -> BoxedSqlQuery<'f, DB, SqlQuery>
where
    DB: Backend + HasSqlType<Text> + HasSqlType<Binary> + HasSqlType<BigInt>,
    String: ToSql<Text, DB>,
    Vec<u8>: ToSql<Binary, DB>,
    i64: ToSql<BigInt, DB>,
{
    let mut query = diesel::sql_query(sql.to_string()).into_boxed::<DB>();
    for param in params {
        query = match param {
            SqlParam::Text(v) => query.bind::<Text, _>(v),
            SqlParam::Blob(v) => query.bind::<Binary, _>(v),
            SqlParam::BigInt(v) => query.bind::<BigInt, _>(v),
        };
    }
    query
}

#[derive(QueryableByName)]
pub(crate) struct EntryRow {
    #[diesel(sql_type = Binary)]
    pub value: Vec<u8>,
    #[diesel(sql_type = BigInt)]
    pub expiry: i64,
}

impl From<EntryRow> for StoredRow {
    fn from(row: EntryRow) -> Self {
        StoredRow {
            value: row.value,
            expiry: row.expiry,
        }
    }
}

#[derive(QueryableByName)]
pub(crate) struct CountRow {
    #[diesel(sql_type = BigInt)]
    pub n: i64,
}

#[derive(QueryableByName)]
pub(crate) struct TextRow {
    #[diesel(sql_type = Text)]
    pub t: String,
}
