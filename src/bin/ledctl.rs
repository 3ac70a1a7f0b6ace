//! Command-line client for the WS2812B LED controller's HTTP API.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "ledctl")]
#[command(about = "Control a WS2812B LED controller over HTTP", long_about = None)]
struct Cli {
    /// Controller base URL
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Set every LED to an RGB color
    Set { r: u8, g: u8, b: u8 },
    /// Set every LED to a named preset color
    Color { name: String },
    /// Turn every LED off
    Off,
    /// Set strip brightness (0-255)
    Brightness { value: u8 },
    /// Print controller health and host statistics
    Health,
    /// List the preset color names
    Presets,
    /// Start the rainbow cycle
    Rainbow,
    /// Start breathing in a color (white by default)
    Breathing {
        #[arg(requires_all = ["g", "b"], conflicts_with = "color")]
        r: Option<u8>,
        g: Option<u8>,
        b: Option<u8>,
        /// Named preset instead of R G B
        #[arg(long)]
        color: Option<String>,
    },
    /// Stop the running animation
    Stop,
}

/// `host:port` from an `http://host:port[/...]` URL
fn authority(url: &str) -> Result<String> {
    let Some(rest) = url.strip_prefix("http://") else {
        bail!("only http:// URLs are supported: {}", url);
    };
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        bail!("missing host in {}", url);
    }
    Ok(if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:80", host)
    })
}

/// Percent-encode a query value, leaving only unreserved characters as-is
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn request_path(command: &Command) -> String {
    match command {
        Command::Set { r, g, b } => format!("/update?r={}&g={}&b={}", r, g, b),
        Command::Color { name } => format!("/update?color={}", encode_query_value(name)),
        Command::Off => "/clear".to_string(),
        Command::Brightness { value } => format!("/brightness?value={}", value),
        Command::Health => "/health".to_string(),
        Command::Presets => "/presets".to_string(),
        Command::Rainbow => "/animation/rainbow".to_string(),
        Command::Breathing {
            color: Some(name), ..
        } => format!("/animation/breathing?color={}", encode_query_value(name)),
        Command::Breathing {
            r: Some(r),
            g: Some(g),
            b: Some(b),
            ..
        } => format!("/animation/breathing?r={}&g={}&b={}", r, g, b),
        Command::Breathing { .. } => "/animation/breathing".to_string(),
        Command::Stop => "/animation/stop".to_string(),
    }
}

/// Issue a GET and return the status code and body
fn get(authority: &str, path: &str) -> Result<(u16, String)> {
    let addr = authority
        .to_socket_addrs()
        .context(format!("Failed to resolve {}", authority))?
        .next()
        .context(format!("No address for {}", authority))?;

    let mut stream = TcpStream::connect_timeout(&addr, TIMEOUT)
        .context(format!("Connection to {} failed", authority))?;
    stream.set_read_timeout(Some(TIMEOUT))?;
    stream.set_write_timeout(Some(TIMEOUT))?;

    write!(
        stream,
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, authority
    )?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    parse_response(&response)
}

fn parse_response(response: &str) -> Result<(u16, String)> {
    let (head, body) = response
        .split_once("\r\n\r\n")
        .context("Malformed HTTP response")?;
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .context("Missing status code in response")?;
    Ok((status, body.to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let authority = authority(&cli.url)?;
    let path = request_path(&cli.command);

    let (status, body) = get(&authority, &path)?;
    if !(200..300).contains(&status) {
        bail!("{} returned {}: {}", path, status, body.trim());
    }

    match cli.command {
        Command::Health | Command::Presets | Command::Stop => println!("{}", body.trim()),
        _ => println!("✓ {}", path),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority() {
        assert_eq!(authority("http://pi.local:8080").unwrap(), "pi.local:8080");
        assert_eq!(authority("http://10.0.0.2/").unwrap(), "10.0.0.2:80");
        assert!(authority("https://pi.local").is_err());
        assert!(authority("http://").is_err());
    }

    #[test]
    fn test_request_paths() {
        assert_eq!(
            request_path(&Command::Set { r: 1, g: 2, b: 3 }),
            "/update?r=1&g=2&b=3"
        );
        assert_eq!(request_path(&Command::Off), "/clear");
        assert_eq!(
            request_path(&Command::Breathing {
                r: None,
                g: None,
                b: None,
                color: Some("red".to_string()),
            }),
            "/animation/breathing?color=red"
        );
        assert_eq!(
            request_path(&Command::Breathing {
                r: None,
                g: None,
                b: None,
                color: None,
            }),
            "/animation/breathing"
        );
    }

    #[test]
    fn test_color_names_are_encoded() {
        assert_eq!(encode_query_value("warm-white"), "warm-white");
        assert_eq!(encode_query_value("warm white"), "warm%20white");
        assert_eq!(encode_query_value("a&b=c"), "a%26b%3Dc");
        assert_eq!(
            request_path(&Command::Color {
                name: "sky blue&r=9".to_string()
            }),
            "/update?color=sky%20blue%26r%3D9"
        );
        assert_eq!(
            request_path(&Command::Breathing {
                r: None,
                g: None,
                b: None,
                color: Some("50%".to_string()),
            }),
            "/animation/breathing?color=50%25"
        );
    }

    #[test]
    fn test_parse_response() {
        let (status, body) =
            parse_response("HTTP/1.1 400 Bad Request\r\nContent-Length: 2\r\n\r\nno").unwrap();
        assert_eq!(status, 400);
        assert_eq!(body, "no");
        assert!(parse_response("nonsense").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["ledctl", "--url", "http://x:1", "breathing", "1", "2", "3"])
            .unwrap();
        assert_eq!(request_path(&cli.command), "/animation/breathing?r=1&g=2&b=3");
        assert!(Cli::try_parse_from(["ledctl", "breathing", "1"]).is_err());
    }
}
