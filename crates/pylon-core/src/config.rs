//! Connection credentials for a configured network.

use serde::{Deserialize, Serialize};

/// Everything needed to establish and authenticate one upstream connection.
///
/// Loaded from the datastore at startup or supplied by the configuration UI;
/// the relay core never reads storage itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCredentials {
    /// Hostname of the IRC network to connect to.
    pub hostname: String,
    /// Port to connect on.
    pub port: u16,
    /// Nickname to register with.
    pub nickname: String,
    /// Ident/username for the USER registration line.
    pub username: String,
    /// Real name for the USER registration line.
    pub realname: String,
    /// Server password, if the network requires one.
    pub password: Option<String>,
    /// Numeric usermode sent in the USER registration line.
    pub usermode: u8,
}

impl NetworkCredentials {
    /// Credentials with the usual defaults: no password, usermode 0.
    pub fn new(
        hostname: impl Into<String>,
        port: u16,
        nickname: impl Into<String>,
        username: impl Into<String>,
        realname: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            nickname: nickname.into(),
            username: username.into(),
            realname: realname.into(),
            password: None,
            usermode: 0,
        }
    }
}
