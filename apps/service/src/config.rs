use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use std::{env, fmt, fs, io, path};

use thiserror::Error;

use crate::monitoring::{DispatchMode, ProbeKind};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config {path}: {source}")]
    ReadFailed {
        path: path::PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    WriteFailed {
        path: path::PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
    #[error("missing required key '{0}'")]
    MissingKey(&'static str),
    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue { key: String, value: String, reason: String },
    #[error("{kind} probe command '{program}' was not found")]
    CommandNotFound { kind: ProbeKind, program: String },
}

impl Error {
    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Error::InvalidValue { key: key.to_string(), value: value.to_string(), reason: reason.into() }
    }
}

/// Flat key/value configuration as stored on disk.
///
/// Scalar TOML values of any type are kept as their string form; parsing
/// into typed settings happens in [`ServiceConfig::from_properties`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(BTreeMap<String, String>);

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pinger/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("pinger/config.toml"))
}

impl Properties {
    /// Load properties from file
    ///
    /// Creates a default config in ~/.config/pinger/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust
    /// let props = config::Properties::from_config(None::<&path::Path>)?;
    /// let cfg = config::ServiceConfig::from_properties(&props)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            Self::parse(&raw_string)
        } else {
            let props = Self::default_service();
            props.write_config(&config_path)?;
            Ok(props)
        }
    }

    /// Parse a flat TOML table
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let table: toml::Table = toml::from_str(raw)?;

        table
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    other => {
                        return Err(Error::invalid(&key, &other.to_string(), "expected a scalar"));
                    }
                };
                Ok((key, value))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Properties)
    }

    /// Serialize and write properties to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(&self.0)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    fn require(&self, key: &'static str) -> Result<&str, Error> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty()).ok_or(Error::MissingKey(key))
    }

    fn default_service() -> Self {
        let mut props = Self::default();
        props.set("hosts", "localhost");
        props.set("icmp", "ping -c 4");
        props.set("trace", "traceroute");
        props.set("localhost-timeout", "2000");
        props.set("delay", "0");
        props.set("period", "60000");
        props
    }
}

/// Typed settings for the probing service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub hosts: Vec<String>,
    pub icmp_command: Vec<String>,
    pub trace_command: Vec<String>,
    /// HTTP connect timeout per host; hosts without one skip the HTTP probe
    pub tcp_timeouts: HashMap<String, Duration>,
    pub report_endpoint: Option<String>,
    pub log_file: Option<path::PathBuf>,
    pub delay: Duration,
    pub period: Duration,
    pub workers: Option<usize>,
    pub dispatch: DispatchMode,
}

impl ServiceConfig {
    pub fn from_properties(props: &Properties) -> Result<Self, Error> {
        let hosts: Vec<String> = props
            .require("hosts")?
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(String::from)
            .collect();
        if hosts.is_empty() {
            return Err(Error::MissingKey("hosts"));
        }

        let mut tcp_timeouts = HashMap::new();
        for host in &hosts {
            let key = format!("{host}-timeout");
            if let Some(value) = props.get(&key) {
                tcp_timeouts.insert(host.clone(), parse_millis(&key, value)?);
            }
        }

        let period_key = "period";
        let period = parse_millis(period_key, props.require(period_key)?)?;
        if period.is_zero() {
            return Err(Error::invalid(period_key, "0", "must be greater than zero"));
        }

        let workers = match props.get("workers") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(0) => return Err(Error::invalid("workers", value, "must be at least 1")),
                Ok(n) => Some(n),
                Err(e) => return Err(Error::invalid("workers", value, e.to_string())),
            },
            None => None,
        };

        let dispatch = match props.get("dispatch") {
            Some(value) => value.parse().map_err(|e| Error::invalid("dispatch", value, e))?,
            None => DispatchMode::default(),
        };

        Ok(Self {
            icmp_command: split_command(props.require("icmp")?),
            trace_command: split_command(props.require("trace")?),
            hosts,
            tcp_timeouts,
            report_endpoint: non_empty(props.get("report-service-endpoint")),
            log_file: non_empty(props.get("log-file")).map(path::PathBuf::from),
            delay: parse_millis("delay", props.require("delay")?)?,
            period,
            workers,
            dispatch,
        })
    }

    /// Check that both probe programs can be launched
    pub fn ensure_commands_available(&self) -> Result<(), Error> {
        for (kind, command) in
            [(ProbeKind::Icmp, &self.icmp_command), (ProbeKind::Trace, &self.trace_command)]
        {
            let program = command.first().map(String::as_str).unwrap_or_default();
            if !program_exists(program) {
                return Err(Error::CommandNotFound { kind, program: program.to_string() });
            }
        }
        Ok(())
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, Error> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| Error::invalid(key, value, e.to_string()))
}

fn split_command(template: &str) -> Vec<String> {
    template.split_whitespace().map(String::from).collect()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

fn program_exists(program: &str) -> bool {
    if program.is_empty() {
        return false;
    }
    if program.contains(path::MAIN_SEPARATOR) {
        return path::Path::new(program).is_file();
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

impl fmt::Display for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);
        let none = "none".to_string();

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Probes")?;
        write_1(f, "Hosts", &self.hosts.join(", "))?;
        write_1(f, "ICMP Command", &self.icmp_command.join(" "))?;
        write_1(f, "Trace Command", &self.trace_command.join(" "))?;
        write_title_1(f, "HTTP Timeouts")?;
        for host in &self.hosts {
            match self.tcp_timeouts.get(host) {
                Some(timeout) => write_2(f, host, &format!("{}ms", timeout.as_millis()))?,
                None => write_2(f, host, &"skipped")?,
            }
        }
        write_title_1(f, "Schedule")?;
        write_1(f, "Delay", &format!("{}ms", self.delay.as_millis()))?;
        write_1(f, "Period", &format!("{}ms", self.period.as_millis()))?;
        write_1(f, "Dispatch", &self.dispatch)?;
        write_1(
            f,
            "Workers",
            &self.workers.map(|n| n.to_string()).unwrap_or_else(|| "one per host".into()),
        )?;
        write_title_1(f, "Output")?;
        write_1(f, "Report Endpoint", self.report_endpoint.as_ref().unwrap_or(&none))?;
        write_1(
            f,
            "Log File",
            &self.log_file.as_ref().map(|p| p.display().to_string()).unwrap_or(none.clone()),
        )?;

        Ok(())
    }
}
