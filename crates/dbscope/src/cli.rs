//! Command-line arguments.

use clap::{Args, Parser, Subcommand, ValueEnum};
use dbscope_core::{ConnectionConfig, IdentifierQuoting, ProfilerOptions, DEFAULT_SCHEMA};

#[derive(Debug, Parser)]
#[command(name = "dbscope")]
#[command(about = "Schema discovery, column profiling, and ad-hoc queries for PostgreSQL")]
#[command(version)]
#[command(long_about = "
dbscope - PostgreSQL schema discovery and column profiling

Walks a schema's tables and columns, profiles each column by its declared
type, and runs ad-hoc SQL:
- text and character varying columns list their distinct values
- integer, bigint, numeric and double precision columns get avg/min/max
- every other column is reported as having no summary

EXAMPLES:
  dbscope --host localhost --database shop --user app tables
  dbscope snapshot --workers 4 --json > shop.json
  dbscope profile orders status
  dbscope query 'SELECT count(*) FROM orders'
")]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List tables in the schema
    Tables,
    /// List the columns of a table in declaration order
    Columns {
        /// Table name
        table: String,
    },
    /// Walk the schema and profile every column
    Snapshot(SnapshotArgs),
    /// Profile a single column
    Profile {
        /// Table name
        table: String,
        /// Column name
        column: String,
    },
    /// Run SQL and print the result
    Query {
        /// SQL text, sent verbatim
        sql: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Columns profiled concurrently, each on its own connection
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,

    /// Keep at most this many distinct values per textual column
    #[arg(long)]
    pub distinct_limit: Option<usize>,

    /// Print the snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

impl SnapshotArgs {
    pub fn profiler_options(&self) -> ProfilerOptions {
        let options = ProfilerOptions::default().with_workers(self.workers);
        match self.distinct_limit {
            Some(limit) => options.with_distinct_limit(limit),
            None => options,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QuotingArg {
    Quoted,
    Verbatim,
}

impl From<QuotingArg> for IdentifierQuoting {
    fn from(arg: QuotingArg) -> Self {
        match arg {
            QuotingArg::Quoted => IdentifierQuoting::Quoted,
            QuotingArg::Verbatim => IdentifierQuoting::Verbatim,
        }
    }
}

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Server hostname or IP
    #[arg(long, env = "DBSCOPE_HOST", default_value = "localhost")]
    pub host: String,

    /// Server port
    #[arg(long, env = "DBSCOPE_PORT", default_value_t = 5432)]
    pub port: u16,

    /// Database name
    #[arg(short, long, env = "DBSCOPE_DATABASE")]
    pub database: String,

    /// Login username
    #[arg(short, long, env = "DBSCOPE_USER")]
    pub user: String,

    /// Password; prompted for when not given
    #[arg(long, env = "DBSCOPE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Schema to walk
    #[arg(long, env = "DBSCOPE_SCHEMA", default_value = DEFAULT_SCHEMA)]
    pub schema: String,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub connect_timeout: u32,

    /// Per-statement timeout in seconds, 0 to disable
    #[arg(long, default_value_t = 30)]
    pub query_timeout: u32,

    /// How table and column names are written into profiling SQL
    #[arg(long, value_enum, default_value_t = QuotingArg::Quoted)]
    pub identifiers: QuotingArg,
}

impl ConnectionArgs {
    pub fn to_config(&self) -> Result<ConnectionConfig, String> {
        ConnectionConfig::builder()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .schema(&self.schema)
            .connect_timeout_secs(self.connect_timeout)
            .query_timeout_secs((self.query_timeout > 0).then_some(self.query_timeout))
            .identifier_quoting(self.identifiers.into())
            .build()
    }
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Log filter, e.g. `dbscope_core=debug`
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}
