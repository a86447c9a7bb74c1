//! Control plane configuration

use std::time::Duration;

/// Inclusive range of listener ports handed out to tunnels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn range(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Number of ports in the range
    pub fn size(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }
}

impl std::str::FromStr for PortRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("Expected START-END, got '{}'", s))?;
        let start = start
            .trim()
            .parse::<u16>()
            .map_err(|e| format!("Invalid start port: {}", e))?;
        let end = end
            .trim()
            .parse::<u16>()
            .map_err(|e| format!("Invalid end port: {}", e))?;
        if start > end {
            return Err(format!("Start port {} > end port {}", start, end));
        }
        Ok(PortRange::range(start, end))
    }
}

#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// How long an active tunnel survives without activity
    pub keep_alive: Duration,
    /// How often expired tunnels are demoted to idle
    pub sweep_interval: Duration,
    /// Listener ports available to tunnels
    pub port_range: PortRange,
    /// Lifetime of issued tunnel credentials
    pub credential_validity: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(10),
            port_range: PortRange::range(49152, 65535),
            credential_validity: Duration::from_secs(3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_range() {
        let range: PortRange = "8000-8010".parse().unwrap();
        assert_eq!(range, PortRange::range(8000, 8010));
        assert_eq!(range.size(), 11);
        assert!(range.contains(8000));
        assert!(range.contains(8010));
        assert!(!range.contains(8011));
    }

    #[test]
    fn test_parse_port_range_errors() {
        assert!("8000".parse::<PortRange>().is_err());
        assert!("9000-8000".parse::<PortRange>().is_err());
        assert!("a-b".parse::<PortRange>().is_err());
    }
}
