use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown service: {0}")]
pub struct ParseServiceError(pub String);

/// The cooperating services. The string form is used as the event `source`
/// and as the consumer suffix of bus subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    #[serde(rename = "identitysvc")]
    Identity,
    #[serde(rename = "authzsvc")]
    Authz,
    #[serde(rename = "inventorysvc")]
    Inventory,
    #[serde(rename = "ordersvc")]
    Order,
    #[serde(rename = "paymentsvc")]
    Payment,
}

impl Service {
    pub const ALL: [Service; 5] = [
        Service::Identity,
        Service::Authz,
        Service::Inventory,
        Service::Order,
        Service::Payment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Identity => "identitysvc",
            Service::Authz => "authzsvc",
            Service::Inventory => "inventorysvc",
            Service::Order => "ordersvc",
            Service::Payment => "paymentsvc",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = ParseServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Service::ALL
            .into_iter()
            .find(|svc| svc.as_str() == s)
            .ok_or_else(|| ParseServiceError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_service_name() {
        for svc in Service::ALL {
            assert_eq!(svc.as_str().parse::<Service>().unwrap(), svc);
        }
        assert!("shippingsvc".parse::<Service>().is_err());
    }
}
