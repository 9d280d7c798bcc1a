use std::io::{self, BufRead, Write};

use respline::{ClientError, Connection, ConnectionConfig};
use tracing::error;

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = ConnectionConfig::from_args(&args);

    let target = match &config.unix_socket {
        Some(path) => path.display().to_string(),
        None => format!("{}:{}", config.host, config.port),
    };

    let mut conn = match Connection::connect(&config).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("Could not connect to {target}: {e}");
            eprintln!("Could not connect to {target}: {e}");
            std::process::exit(1);
        }
    };
    eprintln!("Connected to {target}");

    let stdin = io::stdin();
    let mut reader = stdin.lock();

    loop {
        if conn.db() == 0 {
            print!("{target}> ");
        } else {
            print!("{target}[{}]> ", conn.db());
        }
        io::stdout().flush()?;

        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break; // EOF
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut words = line.split_ascii_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_uppercase();

        // A numeric SELECT goes through Connection::select so the prompt
        // tracks the index. Anything else, including a malformed SELECT, is
        // left for the server to answer.
        let db = match (verb.as_str(), words.next(), words.next()) {
            ("SELECT", Some(index), None) => index.parse().ok(),
            _ => None,
        };
        let result = match db {
            Some(db) => conn.select(db).await,
            None => conn.command(line).await,
        };
        match result {
            Ok(reply) => println!("{reply}"),
            Err(e) => report(&e),
        }

        if verb == "QUIT" || !conn.is_open() {
            break;
        }
    }

    conn.close().await;
    Ok(())
}

fn report(err: &ClientError) {
    if err.is_fatal() {
        eprintln!("Connection lost: {err}");
    } else {
        eprintln!("{err}");
    }
}
