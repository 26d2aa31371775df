use clap::{Parser, Subcommand};
use std::{
    error::Error,
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use influx_wire::{
    CertificateVerification, ClientConfig, ClientError, ClientIdentity, Connection, Credentials,
    Series, ShellCommand, TlsConfig, cli::series_from_assignments, prompt,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server host name
    #[arg(long, default_value = "localhost")]
    host: String,
    /// Server port
    #[arg(short, long, default_value_t = 4649)]
    port: u16,
    /// Connect over a unix domain socket instead of TCP
    #[arg(long)]
    socket: Option<PathBuf>,
    #[arg(short, long, default_value = "root")]
    user: String,
    #[arg(long, default_value = "root")]
    password: String,
    #[arg(short, long, default_value = "debug")]
    database: String,
    /// Read timeout in seconds
    #[arg(long)]
    read_timeout: Option<u64>,
    /// Write timeout in seconds
    #[arg(long)]
    write_timeout: Option<u64>,
    /// Client certificate presented when the server requires TLS
    #[arg(long, default_value = influx_wire::config::DEFAULT_CERT_PATH)]
    tls_cert: PathBuf,
    /// Private key for --tls-cert
    #[arg(long, default_value = influx_wire::config::DEFAULT_KEY_PATH)]
    tls_key: PathBuf,
    /// CA bundle used to verify the server (defaults to the web PKI roots)
    #[arg(long)]
    tls_ca: Option<PathBuf>,
    /// Name checked against the server certificate
    #[arg(long)]
    tls_server_name: Option<String>,
    /// Accept any server certificate. The server is NOT authenticated.
    #[arg(long)]
    tls_skip_verify: bool,
    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand)]
enum Action {
    /// List databases
    Databases,
    /// Check that the server answers
    Ping,
    /// Create a database
    Create { name: String },
    /// Drop a database
    Drop { name: String },
    /// Run a query and print every response frame
    Query { text: String },
    /// Write one point: `write cpu value=0.5 host=web1`
    Write {
        series: String,
        #[arg(required = true)]
        values: Vec<String>,
    },
}

impl Cli {
    fn config(&self) -> ClientConfig {
        let credentials = Credentials::new(&self.user, &self.password, &self.database);
        let config = match &self.socket {
            Some(path) => ClientConfig::unix(path, credentials),
            None => ClientConfig::tcp(&self.host, self.port, credentials),
        };

        config
            .with_read_timeout(self.read_timeout.map(Duration::from_secs))
            .with_write_timeout(self.write_timeout.map(Duration::from_secs))
            .with_tls(TlsConfig {
                identity: Some(ClientIdentity {
                    cert: self.tls_cert.clone(),
                    key: self.tls_key.clone(),
                }),
                verification: if self.tls_skip_verify {
                    CertificateVerification::SkipVerification
                } else {
                    CertificateVerification::Strict
                },
                ca_file: self.tls_ca.clone(),
                server_name: self.tls_server_name.clone(),
            })
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let mut conn = Connection::connect(&cli.config())?;

    let res = match cli.command {
        Some(action) => run_action(&mut conn, action),
        None => shell(&mut conn),
    };

    conn.close();
    res
}

fn run_action(conn: &mut Connection, action: Action) -> Result<(), Box<dyn Error>> {
    let command = match action {
        Action::Databases => ShellCommand::ListDatabases,
        Action::Ping => ShellCommand::Ping,
        Action::Create { name } => ShellCommand::CreateDatabase(name),
        Action::Drop { name } => ShellCommand::DropDatabase(name),
        Action::Query { text } => ShellCommand::Query(text),
        Action::Write { series, values } => {
            ShellCommand::Write(series_from_assignments(&series, &values)?)
        }
    };
    execute(conn, command, &mut io::stdout().lock())
}

fn shell(conn: &mut Connection) -> Result<(), Box<dyn Error>> {
    let stdin = io::stdin();
    let stdout = io::stdout();

    loop {
        let Some(line) = prompt(stdin.lock(), stdout.lock())? else {
            break;
        };

        let cmd = match ShellCommand::try_from(line.as_str()) {
            Ok(ShellCommand::Exit) => break,
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        if let Err(e) = execute(conn, cmd, &mut stdout.lock()) {
            eprintln!("error: {e}");
            // Validation errors leave the session intact; anything else does not.
            if !matches!(
                e.downcast_ref::<ClientError>(),
                Some(ClientError::Series(_))
            ) {
                break;
            }
        }
    }

    Ok(())
}

fn execute<W: Write>(
    conn: &mut Connection,
    cmd: ShellCommand,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    match cmd {
        ShellCommand::Exit => {}
        ShellCommand::Ping => writeln!(out, "pong: {}", conn.ping()?)?,
        ShellCommand::ListDatabases => {
            for database in conn.list_databases()? {
                writeln!(out, "db: {database}")?;
            }
        }
        ShellCommand::CreateDatabase(name) => {
            conn.create_database(&name)?;
            writeln!(out, "created {name}")?;
        }
        ShellCommand::DropDatabase(name) => {
            conn.drop_database(&name)?;
            writeln!(out, "dropped {name}")?;
        }
        ShellCommand::Write(series) => {
            let name = series.series_name().to_string();
            conn.write_series(vec![series])?;
            writeln!(out, "wrote 1 point to {name}")?;
        }
        ShellCommand::Query(text) => {
            for response in conn.query(&text)? {
                let response = response?;
                print_response(out, response.series_list())?;
            }
        }
    }
    Ok(())
}

fn print_response<W: Write>(out: &mut W, series: &[Series]) -> io::Result<()> {
    for s in series {
        writeln!(out, "{} [{}]", s.series_name(), s.fields.join(", "))?;
        for point in &s.points {
            let values = point
                .values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            match point.timestamp {
                Some(ts) => writeln!(out, "  {ts}: {}", values.join(", "))?,
                None => writeln!(out, "  {}", values.join(", "))?,
            }
        }
    }
    Ok(())
}
