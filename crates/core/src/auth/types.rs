use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

/// Caller role. Agents see every ticket unmasked; customers see only
/// their own tickets with AI output hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(Role::Agent),
            "customer" => Ok(Role::Customer),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
    pub method: String,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            role: Role::Customer,
            method: "none".to_string(),
        }
    }

    pub fn agent(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Agent,
            method: "none".to_string(),
        }
    }

    pub fn customer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Customer,
            method: "none".to_string(),
        }
    }

    pub fn is_agent(&self) -> bool {
        self.role == Role::Agent
    }
}
