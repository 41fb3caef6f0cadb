//! Process configuration from the environment
//!
//! | Variable | Required | Default |
//! |---|---|---|
//! | `HEMS_ROUTEB_ID` | yes | |
//! | `HEMS_PASSWORD` | yes | |
//! | `HEMS_SERIAL_DEVICE` | no | `/dev/ttyACM0` (`/dev/tty.usbmodem14101` on macOS) |
//! | `HEMS_BAUD_RATE` | no | 115200 |

use hems_client::SessionBuilder;
use hems_core::{HemsError, HemsResult};
use hems_session::Credentials;
use hems_transport::{SerialSettings, DEFAULT_BAUD_RATE};
use std::fmt;

pub const ENV_ROUTEB_ID: &str = "HEMS_ROUTEB_ID";
pub const ENV_PASSWORD: &str = "HEMS_PASSWORD";
pub const ENV_SERIAL_DEVICE: &str = "HEMS_SERIAL_DEVICE";
pub const ENV_BAUD_RATE: &str = "HEMS_BAUD_RATE";

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub credentials: Credentials,
    pub serial_device: String,
    pub baud_rate: u32,
}

impl Config {
    /// Read the configuration from the process environment
    pub fn from_env() -> HemsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`; empty values count as unset
    ///
    /// # Errors
    /// `HemsError::Config` when a required value is missing or the baud rate
    /// is not a positive integer.
    pub fn from_lookup<F>(lookup: F) -> HemsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| HemsError::Config(format!("{} must be specified", key)))
        };

        let route_b_id = required(ENV_ROUTEB_ID)?;
        let password = required(ENV_PASSWORD)?;
        let serial_device = get(ENV_SERIAL_DEVICE)
            .unwrap_or_else(|| SerialSettings::default_port_name().to_string());
        let baud_rate = match get(ENV_BAUD_RATE) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|rate| *rate > 0)
                .ok_or_else(|| {
                    HemsError::Config(format!(
                        "{} is not a valid baud rate: {}",
                        ENV_BAUD_RATE, raw
                    ))
                })?,
            None => DEFAULT_BAUD_RATE,
        };

        Ok(Self {
            credentials: Credentials::new(route_b_id.trim(), password.trim()),
            serial_device,
            baud_rate,
        })
    }

    pub fn session_builder(&self) -> SessionBuilder {
        SessionBuilder::new(self.credentials.clone()).serial(&self.serial_device, self.baud_rate)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("credentials", &self.credentials)
            .field("serial_device", &self.serial_device)
            .field("baud_rate", &self.baud_rate)
            .finish()
    }
}
