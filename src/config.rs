//! Provides the CLI option parser
//!
//! Used to parse the argv/config file into a struct that the reporter binary
//! can consume and use as configuration data.

use crate::expansion::{Expansion, Expansions, UnknownExpansion};
use crate::transport::{HttpConfig, UdpConfig};
use clap::{App, Arg};
use std::env;
use std::error;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::time::Duration;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

/// Longest accepted flush interval, one day.
pub const MAX_FLUSH_INTERVAL: u64 = 86_400;

fn default_version() -> String {
    VERSION.unwrap_or("unknown").to_string()
}

/// Where the reporter gets its host identifier from.
#[derive(Clone, Debug, PartialEq)]
pub enum HostSource {
    /// Series carry no host.
    Unset,
    /// A fixed identifier.
    Fixed(String),
    /// The EC2 instance id, looked up at startup.
    Ec2,
}

/// Which transport to ship series over.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportConfig {
    /// See `transport::HttpTransport`.
    Http(HttpConfig),
    /// See `transport::UdpTransport`.
    Udp(UdpConfig),
    /// See `transport::ConsoleTransport`.
    Console,
}

/// Configuration for the reporter executable
///
/// This struct is what we construct from parsing the configuration file. Please
/// see documentation on `parse_args` in this module for more details.
#[derive(Clone, Debug, PartialEq)]
pub struct Args {
    /// Seconds between report cycles.
    pub flush_interval: u64,
    /// The host identifier attached to every series.
    pub host: HostSource,
    /// Static tags for every series.
    pub tags: Vec<String>,
    /// Enabled expansions of composite metrics.
    pub expansions: Expansions,
    /// Whether to report host telemetry.
    pub vm_metrics: bool,
    /// Leading segment of host telemetry names.
    pub vm_prefix: String,
    /// The transport series are shipped over.
    pub transport: TransportConfig,
    /// The verbosity setting. The higher the value the more chatty the
    /// reporter gets.
    pub verbose: u64,
    /// Version string. This is set automatically.
    pub version: String,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            flush_interval: 60,
            host: HostSource::Unset,
            tags: Vec::new(),
            expansions: Expansions::all(),
            vm_metrics: true,
            vm_prefix: "process".to_string(),
            transport: TransportConfig::Console,
            verbose: 0,
            version: default_version(),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum Error {
    /// The file could not be read.
    Io(io::Error),
    /// The file is not TOML.
    Toml(toml::de::Error),
    /// A key held a value of the wrong shape.
    Invalid {
        /// dotted path of the offending key
        key: String,
        /// what was expected there
        reason: &'static str,
    },
    /// An expansion name was not recognized.
    UnknownExpansion(UnknownExpansion),
    /// A value was to be read from an unset environment variable.
    MissingEnv(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "could not read config file: {}", e),
            Error::Toml(ref e) => write!(f, "could not parse config file: {}", e),
            Error::Invalid { ref key, reason } => write!(f, "{} {}", key, reason),
            Error::UnknownExpansion(ref e) => write!(f, "{}", e),
            Error::MissingEnv(ref var) => {
                write!(f, "environment variable {} could not be read", var)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Toml(ref e) => Some(e),
            Error::UnknownExpansion(ref e) => Some(e),
            Error::Invalid { .. } | Error::MissingEnv(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Error {
        Error::Toml(e)
    }
}

impl From<UnknownExpansion> for Error {
    fn from(e: UnknownExpansion) -> Error {
        Error::UnknownExpansion(e)
    }
}

fn invalid(key: &str, reason: &'static str) -> Error {
    Error::Invalid {
        key: key.to_string(),
        reason,
    }
}

fn as_str<'a>(v: &'a toml::Value, key: &str) -> Result<&'a str, Error> {
    v.as_str().ok_or_else(|| invalid(key, "must be a string"))
}

fn as_u64(v: &toml::Value, key: &str) -> Result<u64, Error> {
    match v.as_integer() {
        Some(i) if i >= 0 => Ok(i as u64),
        _ => Err(invalid(key, "must be a non-negative integer")),
    }
}

fn as_bool(v: &toml::Value, key: &str) -> Result<bool, Error> {
    v.as_bool().ok_or_else(|| invalid(key, "must be a boolean"))
}

/// A string, or a table `{ environment = true, value = "VAR" }` naming the
/// environment variable holding the string.
fn string_or_env(v: &toml::Value, key: &str) -> Result<String, Error> {
    if let Some(s) = v.as_str() {
        return Ok(s.to_string());
    }
    let tbl = v
        .as_table()
        .ok_or_else(|| invalid(key, "must be a string or a table"))?;
    let from_env = match tbl.get("environment") {
        Some(ev) => as_bool(ev, key)?,
        None => false,
    };
    if !from_env {
        return Err(invalid(key, "table must have environment / value keys"));
    }
    let var = tbl
        .get("value")
        .ok_or_else(|| invalid(key, "table must have a value key"))
        .and_then(|v| as_str(v, key))?;
    env::var_os(var)
        .and_then(|v| v.into_string().ok())
        .ok_or_else(|| Error::MissingEnv(var.to_string()))
}

/// Parse the command line and the config file it names
///
/// This function will read the environment arguments and construct an `Args`.
/// The exact specifics of the command line are available via `--help`.
pub fn parse_args() -> Result<Args, Error> {
    let args = App::new("datadog-reporter")
        .version(VERSION.unwrap_or("unknown"))
        .author("Brian L. Troutwine <blt@postmates.com>")
        .about("ship a metrics registry to datadog")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .required(true)
                .help("The config file to feed in.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        )
        .get_matches();

    let verb = if args.is_present("verbose") {
        args.occurrences_of("verbose")
    } else {
        0
    };

    match args.value_of("config-file") {
        Some(filename) => {
            let mut fp = File::open(filename)?;
            let mut buffer = String::new();
            fp.read_to_string(&mut buffer)?;
            parse_config_file(&buffer, verb)
        }
        None => unreachable!(),
    }
}

/// Parse the text of a config file.
pub fn parse_config_file(buffer: &str, verbosity: u64) -> Result<Args, Error> {
    let mut args = Args::default();
    let value: toml::Value = toml::from_str(buffer)?;

    args.verbose = verbosity;

    if let Some(fi) = value.get("flush-interval") {
        args.flush_interval = as_u64(fi, "flush-interval")?;
        if args.flush_interval == 0 {
            return Err(invalid("flush-interval", "must be at least 1"));
        }
        if args.flush_interval > MAX_FLUSH_INTERVAL {
            return Err(invalid("flush-interval", "must be at most 86400"));
        }
    }

    match (value.get("host"), value.get("ec2-host")) {
        (Some(_), Some(_)) => {
            return Err(invalid("host", "cannot be combined with ec2-host"));
        }
        (Some(h), None) => args.host = HostSource::Fixed(string_or_env(h, "host")?),
        (None, Some(ec2)) => {
            if as_bool(ec2, "ec2-host")? {
                args.host = HostSource::Ec2;
            }
        }
        (None, None) => {}
    }

    if let Some(tags) = value.get("tags") {
        args.tags = parse_tags(tags)?;
    }

    if let Some(exps) = value.get("expansions") {
        let arr = exps
            .as_array()
            .ok_or_else(|| invalid("expansions", "must be an array of strings"))?;
        let mut set = Expansions::none();
        for e in arr {
            set.insert(as_str(e, "expansions")?.parse::<Expansion>()?);
        }
        args.expansions = set;
    }

    if let Some(vm) = value.get("vm-metrics") {
        args.vm_metrics = as_bool(vm, "vm-metrics")?;
    }

    if let Some(prefix) = value.get("vm-prefix") {
        args.vm_prefix = as_str(prefix, "vm-prefix")?.to_string();
    }

    if let Some(transport) = value.get("transport") {
        args.transport = parse_transport(transport)?;
    }

    Ok(args)
}

/// Tags are either an array of ready-made strings or a table whose entries
/// become `key:value`.
fn parse_tags(tags: &toml::Value) -> Result<Vec<String>, Error> {
    if let Some(arr) = tags.as_array() {
        return arr
            .iter()
            .map(|t| as_str(t, "tags").map(|s| s.to_string()))
            .collect();
    }
    let tbl = tags
        .as_table()
        .ok_or_else(|| invalid("tags", "must be an array or a table"))?;
    let mut res = Vec::with_capacity(tbl.len());
    for (k, v) in tbl.iter() {
        let val = string_or_env(v, &format!("tags.{}", k))?;
        res.push(format!("{}:{}", k, val));
    }
    Ok(res)
}

fn parse_transport(transport: &toml::Value) -> Result<TransportConfig, Error> {
    let tbl = transport
        .as_table()
        .ok_or_else(|| invalid("transport", "must be a table"))?;
    if tbl.len() > 1 {
        return Err(invalid("transport", "must configure exactly one transport"));
    }

    if let Some(http) = tbl.get("http") {
        let mut res = HttpConfig::default();
        res.api_key = http
            .get("api-key")
            .ok_or_else(|| invalid("transport.http.api-key", "is required"))
            .and_then(|k| string_or_env(k, "transport.http.api-key"))?;
        if let Some(endpoint) = http.get("endpoint") {
            res.endpoint = as_str(endpoint, "transport.http.endpoint")?.to_string();
        }
        if let Some(timeout) = http.get("timeout") {
            res.timeout = Duration::from_secs(as_u64(timeout, "transport.http.timeout")?);
        }
        return Ok(TransportConfig::Http(res));
    }

    if let Some(udp) = tbl.get("udp") {
        let mut res = UdpConfig::default();
        if let Some(host) = udp.get("host") {
            res.host = as_str(host, "transport.udp.host")?.to_string();
        }
        if let Some(port) = udp.get("port") {
            let port = as_u64(port, "transport.udp.port")?;
            if port > u64::from(u16::max_value()) {
                return Err(invalid("transport.udp.port", "must fit in 16 bits"));
            }
            res.port = port as u16;
        }
        if let Some(prefix) = udp.get("prefix") {
            res.prefix = Some(as_str(prefix, "transport.udp.prefix")?.to_string());
        }
        if let Some(size) = udp.get("max-packet-size") {
            res.max_packet_size = as_u64(size, "transport.udp.max-packet-size")? as usize;
        }
        return Ok(TransportConfig::Udp(res));
    }

    if tbl.get("console").is_some() || tbl.is_empty() {
        return Ok(TransportConfig::Console);
    }

    Err(invalid("transport", "must be one of http, udp or console"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_file_defaults() {
        let args = parse_config_file("", 4).unwrap();
        assert_eq!(4, args.verbose);
        assert_eq!(60, args.flush_interval);
        assert_eq!(HostSource::Unset, args.host);
        assert!(args.tags.is_empty());
        assert_eq!(Expansions::all(), args.expansions);
        assert!(args.vm_metrics);
        assert_eq!("process", args.vm_prefix);
        assert_eq!(TransportConfig::Console, args.transport);
    }

    #[test]
    fn config_flush_interval() {
        let config = r#"
flush-interval = 10
"#;
        let args = parse_config_file(config, 4).unwrap();
        assert_eq!(10, args.flush_interval);
    }

    #[test]
    fn config_flush_interval_zero_rejected() {
        assert!(parse_config_file("flush-interval = 0", 0).is_err());
        assert!(parse_config_file("flush-interval = -3", 0).is_err());
    }

    #[test]
    fn config_flush_interval_upper_bound() {
        let args = parse_config_file("flush-interval = 86400", 0).unwrap();
        assert_eq!(MAX_FLUSH_INTERVAL, args.flush_interval);
        match parse_config_file("flush-interval = 9223372036854775807", 0) {
            Err(Error::Invalid { ref key, .. }) => assert_eq!("flush-interval", key.as_str()),
            other => panic!("expected invalid flush-interval, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn config_host() {
        let args = parse_config_file(r#"host = "hostname""#, 0).unwrap();
        assert_eq!(HostSource::Fixed("hostname".into()), args.host);

        let args = parse_config_file("ec2-host = true", 0).unwrap();
        assert_eq!(HostSource::Ec2, args.host);

        let args = parse_config_file("ec2-host = false", 0).unwrap();
        assert_eq!(HostSource::Unset, args.host);

        let config = r#"
host = "hostname"
ec2-host = true
"#;
        assert!(parse_config_file(config, 0).is_err());
    }

    #[test]
    fn config_tags_array() {
        let config = r#"
tags = ["env:prod", "team:metrics"]
"#;
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(vec!["env:prod", "team:metrics"], args.tags);
    }

    #[test]
    fn config_tags_table() {
        env::set_var("DATADOG_REPORTER_TEST_TAG", "blue");
        let config = r#"
[tags]
env = "prod"
color = { environment = true, value = "DATADOG_REPORTER_TEST_TAG" }
"#;
        let args = parse_config_file(config, 0).unwrap();
        let mut tags = args.tags.clone();
        tags.sort();
        assert_eq!(vec!["color:blue", "env:prod"], tags);
    }

    #[test]
    fn config_expansions() {
        let config = r#"
expansions = ["count", "p99", "1MinuteRate"]
"#;
        let args = parse_config_file(config, 0).unwrap();
        let expected: Expansions = vec![Expansion::Count, Expansion::P99, Expansion::Rate1Minute]
            .into_iter()
            .collect();
        assert_eq!(expected, args.expansions);
    }

    #[test]
    fn config_unknown_expansion() {
        match parse_config_file(r#"expansions = ["p50"]"#, 0) {
            Err(Error::UnknownExpansion(UnknownExpansion(ref s))) => assert_eq!("p50", s.as_str()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn config_vm() {
        let config = r#"
vm-metrics = false
vm-prefix = "jvm"
"#;
        let args = parse_config_file(config, 0).unwrap();
        assert!(!args.vm_metrics);
        assert_eq!("jvm", args.vm_prefix);
    }

    #[test]
    fn config_transport_http() {
        let config = r#"
[transport.http]
api-key = "12345"
endpoint = "http://127.0.0.1:8080"
timeout = 3
"#;
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(
            TransportConfig::Http(HttpConfig {
                api_key: "12345".into(),
                endpoint: "http://127.0.0.1:8080".into(),
                timeout: Duration::from_secs(3),
            }),
            args.transport
        );
    }

    #[test]
    fn config_transport_http_key_from_env() {
        env::set_var("DATADOG_REPORTER_TEST_KEY", "abcdef");
        let config = r#"
[transport.http]
api-key = { environment = true, value = "DATADOG_REPORTER_TEST_KEY" }
"#;
        match parse_config_file(config, 0).unwrap().transport {
            TransportConfig::Http(cfg) => {
                assert_eq!("abcdef", cfg.api_key);
                assert_eq!(HttpConfig::default().endpoint, cfg.endpoint);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn config_transport_http_missing_env() {
        let config = r#"
[transport.http]
api-key = { environment = true, value = "DATADOG_REPORTER_TEST_UNSET_KEY" }
"#;
        match parse_config_file(config, 0) {
            Err(Error::MissingEnv(ref var)) => assert_eq!("DATADOG_REPORTER_TEST_UNSET_KEY", var.as_str()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn config_transport_http_requires_key() {
        assert!(parse_config_file("[transport.http]", 0).is_err());
    }

    #[test]
    fn config_transport_udp() {
        let config = r#"
[transport.udp]
host = "127.0.0.1"
port = 9125
prefix = "app"
max-packet-size = 512
"#;
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(
            TransportConfig::Udp(UdpConfig {
                host: "127.0.0.1".into(),
                port: 9125,
                prefix: Some("app".into()),
                max_packet_size: 512,
            }),
            args.transport
        );
    }

    #[test]
    fn config_transport_udp_defaults() {
        let args = parse_config_file("[transport.udp]", 0).unwrap();
        assert_eq!(TransportConfig::Udp(UdpConfig::default()), args.transport);
    }

    #[test]
    fn config_transport_exclusive() {
        let config = r#"
[transport.udp]
[transport.console]
"#;
        assert!(parse_config_file(config, 0).is_err());
        assert!(parse_config_file("[transport.kafka]", 0).is_err());
    }

    #[test]
    fn config_not_toml() {
        match parse_config_file("flush-interval = = 1", 0) {
            Err(Error::Toml(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
