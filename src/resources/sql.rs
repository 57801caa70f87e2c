//! Identifier and query safety layer
//!
//! Object names cannot be bound as parameters in DDL, so every statement the
//! operator issues is rendered through [`Statement`], which double-quotes
//! identifiers and single-quotes secret literals. Privilege and object-type
//! tokens are checked against fixed allow-lists before anything is rendered.

use thiserror::Error;

use crate::resources::postgres_client::{BoxError, SqlSession};

/// Privileges accepted on `GRANT ... ON DATABASE`
pub const DATABASE_PRIVILEGES: &[&str] = &["CONNECT", "CREATE", "TEMPLATE", "TEMPORARY"];

/// Object classes accepted by default-privilege and bulk-grant statements
pub const OBJECT_TYPES: &[&str] = &[
    "TABLES",
    "SEQUENCES",
    "FUNCTIONS",
    "ROUTINES",
    "TYPES",
    "SCHEMAS",
];

/// Object classes that can be addressed with `ON ALL <type> IN SCHEMA`
pub const BULK_OBJECT_TYPES: &[&str] = &["TABLES", "SEQUENCES", "FUNCTIONS", "ROUTINES"];

/// Privileges accepted on schemas and schema objects
pub const OBJECT_PRIVILEGES: &[&str] = &[
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "TRUNCATE",
    "REFERENCES",
    "TRIGGER",
    "USAGE",
    "CONNECT",
    "CREATE",
    "EXECUTE",
    "ALL",
];

const REDACTED: &str = "********";

/// Errors raised while building or running SQL
#[derive(Error, Debug)]
pub enum SqlError {
    /// A statement or query was rejected by the server or the connection broke
    #[error(
        "Unable to execute query '{query}' with arguments {}\n{source}",
        format_arguments(.args)
    )]
    Execution {
        query: String,
        args: Vec<String>,
        #[source]
        source: BoxError,
    },

    /// A token was not part of its allow-list
    #[error("The argument '{argument}' has an illegal value of '{value}'")]
    IllegalArgument {
        argument: &'static str,
        value: String,
    },

    /// No session could be opened for the named database
    #[error("Unable to open a session on database '{database}'\n{source}")]
    Session {
        database: String,
        #[source]
        source: BoxError,
    },

    /// A catalog lookup that must return a row returned none
    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: &'static str, name: String },
}

/// Result type for SQL operations
pub type SqlResult<T> = std::result::Result<T, SqlError>;

impl SqlError {
    fn execution(query: &str, args: Vec<String>, source: BoxError) -> Self {
        SqlError::Execution {
            query: query.to_string(),
            args,
            source,
        }
    }

    /// The driver error behind an execution or session failure, if any
    pub fn driver_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            SqlError::Execution { source, .. } | SqlError::Session { source, .. } => {
                Some(source.as_ref())
            }
            _ => None,
        }
    }

    /// Whether the error comes from input that will never be accepted
    pub fn is_illegal_argument(&self) -> bool {
        matches!(self, SqlError::IllegalArgument { .. })
    }
}

fn format_arguments(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("'{}'", a))
        .collect::<Vec<_>>()
        .join(",")
}

/// Quote a SQL identifier (database, role, schema or extension name)
///
/// - `my_table` -> `"my_table"`
/// - `table"name` -> `"table""name"`
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape the body of a SQL string literal by doubling single quotes
pub fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

/// Render a complete single-quoted SQL string literal
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", escape_sql_string(s))
}

/// Check a single token against an allow-list (exact match)
pub fn validate_token(argument: &'static str, value: &str, allowed: &[&str]) -> SqlResult<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(SqlError::IllegalArgument {
            argument,
            value: value.to_string(),
        })
    }
}

/// Check every token of a privilege list against an allow-list
pub fn validate_tokens(argument: &'static str, values: &[String], allowed: &[&str]) -> SqlResult<()> {
    values
        .iter()
        .try_for_each(|value| validate_token(argument, value, allowed))
}

#[derive(Debug, Clone)]
enum Arg {
    Ident(String),
    Keyword(String),
    Secret(String),
}

impl Arg {
    fn render(&self) -> String {
        match self {
            Arg::Ident(name) => quote_identifier(name),
            Arg::Keyword(keyword) => keyword.clone(),
            Arg::Secret(value) => quote_literal(value),
        }
    }

    fn report(&self) -> String {
        match self {
            Arg::Ident(value) | Arg::Keyword(value) => value.clone(),
            Arg::Secret(_) => REDACTED.to_string(),
        }
    }
}

/// A DDL statement with `{}` placeholders filled in order
///
/// ```
/// use postgres_controller::resources::sql::Statement;
///
/// let sql = Statement::new("ALTER DATABASE {} OWNER TO {}")
///     .ident("app")
///     .ident("app_owner")
///     .render();
/// assert_eq!(sql, r#"ALTER DATABASE "app" OWNER TO "app_owner""#);
/// ```
#[derive(Debug, Clone)]
pub struct Statement {
    template: &'static str,
    args: Vec<Arg>,
}

impl Statement {
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            args: Vec::new(),
        }
    }

    /// Append a quoted identifier
    pub fn ident(mut self, name: &str) -> Self {
        self.args.push(Arg::Ident(name.to_string()));
        self
    }

    /// Append an already validated keyword or keyword list verbatim
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.args.push(Arg::Keyword(keyword.into()));
        self
    }

    /// Append a string literal that must never show up in logs or errors
    pub fn secret(mut self, value: &str) -> Self {
        self.args.push(Arg::Secret(value.to_string()));
        self
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    /// The arguments as they appear in error reports (secrets masked)
    pub fn arguments(&self) -> Vec<String> {
        self.args.iter().map(Arg::report).collect()
    }

    /// Render the final SQL text
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.template.len() + 16 * self.args.len());
        let mut args = self.args.iter();
        let mut pieces = self.template.split("{}");
        if let Some(first) = pieces.next() {
            out.push_str(first);
        }
        for piece in pieces {
            if let Some(arg) = args.next() {
                out.push_str(&arg.render());
            }
            out.push_str(piece);
        }
        out
    }

    /// Run the statement, wrapping failures with the template and arguments
    pub async fn execute(self, session: &dyn SqlSession) -> SqlResult<()> {
        let sql = self.render();
        session
            .execute(&sql)
            .await
            .map_err(|source| SqlError::execution(self.template, self.arguments(), source))
    }
}

/// Run a catalog query returning a single boolean
pub async fn query_bool(
    session: &dyn SqlSession,
    query: &'static str,
    params: &[&str],
) -> SqlResult<bool> {
    session
        .query_bool(query, params)
        .await
        .map_err(|source| SqlError::execution(query, to_owned(params), source))
}

/// Run a catalog query returning at most one text value
pub async fn query_text(
    session: &dyn SqlSession,
    query: &'static str,
    params: &[&str],
) -> SqlResult<Option<String>> {
    session
        .query_text(query, params)
        .await
        .map_err(|source| SqlError::execution(query, to_owned(params), source))
}

fn to_owned(params: &[&str]) -> Vec<String> {
    params.iter().map(|p| p.to_string()).collect()
}
