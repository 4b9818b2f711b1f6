use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::session::Credentials;
use crate::source::FixInput;
use crate::viewport::{ViewportFitter, DEFAULT_PADDING};

/// Share your live position with a group and follow everyone else's.
#[derive(Debug, Parser)]
#[command(name = "locsync", version)]
pub struct Config {
    /// Base url of the location backend.
    #[arg(long, env = "LOCSYNC_BACKEND_URL")]
    pub backend_url: Url,

    /// Base url of the live update stream (ws:// or wss://).
    #[arg(long, env = "LOCSYNC_STREAM_URL")]
    pub stream_url: Url,

    /// Your identity within groups, usually an email address.
    #[arg(long, env = "LOCSYNC_IDENTITY")]
    pub identity: String,

    /// Bearer token of the authenticated session.
    #[arg(long, env = "LOCSYNC_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Group to open, by id or name. Without it the groups are listed only.
    #[arg(long)]
    pub group: Option<String>,

    /// File to read position fixes from (`lat,lng` per line). Defaults to stdin.
    #[arg(long)]
    pub fixes: Option<PathBuf>,

    /// Padding in pixels kept around members when fitting the map.
    #[arg(long, default_value_t = DEFAULT_PADDING)]
    pub fit_padding: u32,

    /// Length of the fit animation.
    #[arg(long, default_value_t = 2000)]
    pub fit_duration_ms: u64,
}

impl Config {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            identity: self.identity.clone(),
            token: self.token.clone(),
        }
    }

    pub fn fix_input(&self) -> FixInput {
        match &self.fixes {
            Some(path) if path.as_os_str() != "-" => FixInput::File(path.clone()),
            _ => FixInput::Stdin,
        }
    }

    pub fn fitter(&self) -> ViewportFitter {
        ViewportFitter::new(
            self.fit_padding,
            Duration::from_millis(self.fit_duration_ms),
        )
    }
}
