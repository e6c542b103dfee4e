//! SQL dialects.
//!
//! Everything engine specific about the storage table lives here:
//! placeholders, identifier quoting, the upsert form, the binary column
//! type and the query used to inspect it.

/// A relational engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    Mysql,
}

impl Dialect {
    /// Name used in errors and logs.
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
        }
    }

    /// The `n`th (1-based) bind placeholder.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite | Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quotes an identifier.
    pub fn quote(self, ident: &str) -> String {
        let q = match self {
            Dialect::Mysql => '`',
            Dialect::Sqlite | Dialect::Postgres => '"',
        };
        let escaped = ident.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Column type for encoded values.
    pub fn binary_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "BYTEA",
            Dialect::Sqlite | Dialect::Mysql => "BLOB",
        }
    }

    /// Returns true if `reported` (as returned by [`Self::column_type_query`])
    /// is a binary column type.
    pub fn is_binary_type(self, reported: &str) -> bool {
        let reported = reported.to_ascii_lowercase();
        match self {
            Dialect::Postgres => reported == "bytea",
            Dialect::Sqlite | Dialect::Mysql => reported.contains("blob"),
        }
    }

    /// `CREATE` statements for the table and its expiry index.
    pub fn create_statements(self, table: &str) -> Vec<String> {
        let t = self.quote(table);
        let index = self.quote(&format!("{}_expiry", table));
        let columns = format!(
            "{key} VARCHAR(255) NOT NULL, \
             {ns} VARCHAR(64) NOT NULL DEFAULT '', \
             {value} {binary} NOT NULL, \
             {expiry} BIGINT NOT NULL DEFAULT 0, \
             PRIMARY KEY ({key}, {ns})",
            key = self.quote("key"),
            ns = self.quote("namespace"),
            value = self.quote("value"),
            binary = self.binary_type(),
            expiry = self.quote("expiry"),
        );

        match self {
            // MySQL has no CREATE INDEX IF NOT EXISTS
            Dialect::Mysql => vec![format!(
                "CREATE TABLE IF NOT EXISTS {t} ({columns}, INDEX {index} ({expiry}))",
                expiry = self.quote("expiry"),
            )],
            Dialect::Sqlite | Dialect::Postgres => vec![
                format!("CREATE TABLE IF NOT EXISTS {t} ({columns})"),
                format!(
                    "CREATE INDEX IF NOT EXISTS {index} ON {t} ({})",
                    self.quote("expiry")
                ),
            ],
        }
    }

    /// Query returning the `value` column's type as a single text column
    /// named `t`; binds the table name.
    pub fn column_type_query(self) -> String {
        match self {
            Dialect::Sqlite => {
                "SELECT type AS t FROM pragma_table_info(?) WHERE name = 'value'".to_string()
            }
            Dialect::Postgres => "SELECT data_type::text AS t FROM information_schema.columns \
                 WHERE table_name = $1 AND column_name = 'value'"
                .to_string(),
            Dialect::Mysql => "SELECT CAST(DATA_TYPE AS CHAR) AS t FROM information_schema.COLUMNS \
                 WHERE TABLE_NAME = ? AND COLUMN_NAME = 'value'"
                .to_string(),
        }
    }

    /// Insert-or-replace of `(key, namespace, value, expiry)`.
    pub fn upsert(self, table: &str) -> String {
        let insert = format!(
            "INSERT INTO {} ({}, {}, {}, {}) VALUES ({}, {}, {}, {})",
            self.quote(table),
            self.quote("key"),
            self.quote("namespace"),
            self.quote("value"),
            self.quote("expiry"),
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.placeholder(4),
        );
        let value = self.quote("value");
        let expiry = self.quote("expiry");

        match self {
            Dialect::Mysql => format!(
                "{insert} ON DUPLICATE KEY UPDATE {value} = VALUES({value}), {expiry} = VALUES({expiry})"
            ),
            Dialect::Sqlite | Dialect::Postgres => format!(
                "{insert} ON CONFLICT ({}, {}) DO UPDATE SET {value} = excluded.{value}, {expiry} = excluded.{expiry}",
                self.quote("key"),
                self.quote("namespace"),
            ),
        }
    }
}
