//! Campaign configuration.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, str::FromStr};

/// Default number of phones in one request.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 1;

/// Default bulk messaging endpoint.
pub const DEFAULT_BULK_URL: &str = "https://bulk.sms-online.com/";

/// Default phone lookup endpoint.
pub const DEFAULT_LOOKUP_URL: &str = "https://pc.sms-online.com/";

/// Default media upload endpoint.
pub const DEFAULT_MEDIA_URL: &str = "https://media.sms-online.com/upload/";

/// What each batch is submitted for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Send the campaign message to every phone.
    #[default]
    #[serde(rename = "msg")]
    Message,
    /// Query carrier and location metadata for every phone.
    #[serde(rename = "phi")]
    Lookup,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "msg" => Ok(Self::Message),
            "phi" => Ok(Self::Lookup),
            _ => Err(Error::InvalidConfig("mode must be one of msg, phi")),
        }
    }
}

/// Immutable campaign configuration shared by every stage of the pipeline.
///
/// Optional string fields are considered absent when empty and numeric fields when zero.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,

    pub user: String,
    pub pass: String,
    pub from: String,
    pub texts: Vec<String>,

    pub sending_method: String,
    pub button_text: String,
    pub expiry_txt: String,
    pub label: String,
    pub button_link: String,
    pub image_id: String,
    pub image_file: Option<PathBuf>,
    pub group_id: String,
    pub dlr_timeout: u32,
    pub dlr: bool,

    /// Number of segments every text is expected to occupy.
    pub expected_segments: Option<usize>,

    pub batch_size: usize,
    pub workers: usize,

    /// Aggregate requests per second across all workers (`<= 0` disables pacing).
    pub rate: f64,

    pub bulk_url: String,
    pub lookup_url: String,
    pub media_url: String,

    /// Port to serve metrics on, if any.
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            user: String::new(),
            pass: String::new(),
            from: String::new(),
            texts: Vec::new(),
            sending_method: String::new(),
            button_text: String::new(),
            expiry_txt: String::new(),
            label: String::new(),
            button_link: String::new(),
            image_id: String::new(),
            image_file: None,
            group_id: String::new(),
            dlr_timeout: 0,
            dlr: false,
            expected_segments: None,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            rate: 0.0,
            bulk_url: DEFAULT_BULK_URL.to_string(),
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            media_url: DEFAULT_MEDIA_URL.to_string(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load a configuration from a YAML file.
    ///
    /// Fields missing from the file take their default value.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let file =
            std::fs::read_to_string(path).map_err(|e| Error::ConfigRead(path.to_path_buf(), e))?;
        Ok(serde_yaml::from_str(&file)?)
    }

    /// Ensure the configuration can drive a dispatch.
    pub fn validate(&self) -> Result<(), Error> {
        if self.user.is_empty() {
            return Err(Error::InvalidConfig("user is required"));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be at least 1"));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1"));
        }
        if !self.rate.is_finite() {
            return Err(Error::InvalidConfig("rate must be finite"));
        }
        if self.mode == Mode::Message && self.texts.is_empty() {
            return Err(Error::InvalidConfig("text is required to send messages"));
        }
        Ok(())
    }

    /// Returns the endpoint jobs of the configured [Mode] are submitted to.
    pub fn endpoint(&self) -> &str {
        match self.mode {
            Mode::Message => &self.bulk_url,
            Mode::Lookup => &self.lookup_url,
        }
    }

    /// Returns true if an image must be uploaded before dispatch starts.
    pub fn needs_upload(&self) -> bool {
        self.image_file.is_some() && self.image_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            user: "acme".into(),
            pass: "secret".into(),
            texts: vec!["hello".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mode, Mode::Message);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.workers, 1);
        assert_eq!(config.rate, 0.0);
        assert_eq!(config.endpoint(), DEFAULT_BULK_URL);
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let config = Config {
            batch_size: 0,
            ..valid()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = Config {
            workers: 0,
            ..valid()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = Config {
            rate: f64::NAN,
            ..valid()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = Config {
            texts: Vec::new(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        // Lookups carry no text
        let config = Config {
            mode: Mode::Lookup,
            texts: Vec::new(),
            ..valid()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint(), DEFAULT_LOOKUP_URL);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
mode: phi
user: acme
pass: secret
batch_size: 50
workers: 4
rate: 12.5
dlr: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.mode, Mode::Lookup);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.workers, 4);
        assert_eq!(config.rate, 12.5);
        assert!(config.dlr);
        assert_eq!(config.bulk_url, DEFAULT_BULK_URL);
        assert!(config.texts.is_empty());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("msg".parse::<Mode>().unwrap(), Mode::Message);
        assert_eq!("phi".parse::<Mode>().unwrap(), Mode::Lookup);
        assert!("sms".parse::<Mode>().is_err());
    }

    #[test]
    fn test_needs_upload() {
        let mut config = valid();
        assert!(!config.needs_upload());
        config.image_file = Some(PathBuf::from("banner.png"));
        assert!(config.needs_upload());
        config.image_id = "img-1".into();
        assert!(!config.needs_upload());
    }
}
