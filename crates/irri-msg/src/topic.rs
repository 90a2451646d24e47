//! ---
//! irri_section: "02-messaging-data-model"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Message schema and transport contracts."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use crate::DecodeError;

/// Telemetry and command channels recognised on the device bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// Valve state reports.
    Status,
    /// Weather-station readings.
    Weather,
    /// Device-originated alerts, advisory only.
    Alerts,
    /// Outbound command channel; never consumed by the ingestor.
    Command,
}

impl TopicKind {
    /// Wire suffix for the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::Status => "status",
            TopicKind::Weather => "weather",
            TopicKind::Alerts => "alerts",
            TopicKind::Command => "command",
        }
    }
}

/// Parsed form of a `<namespace>/<device_id>/<kind>` topic string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Installation namespace segment.
    pub namespace: String,
    /// Device identifier segment.
    pub device_id: String,
    /// Channel kind segment.
    pub kind: TopicKind,
}

impl Topic {
    /// Parse a raw topic string, rejecting anything that is not exactly
    /// three non-empty segments with a recognised suffix.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let mut segments = raw.split('/');
        let (Some(namespace), Some(device_id), Some(kind), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(DecodeError::Topic(raw.to_owned()));
        };
        if namespace.is_empty() || device_id.is_empty() {
            return Err(DecodeError::Topic(raw.to_owned()));
        }
        let kind = match kind {
            "status" => TopicKind::Status,
            "weather" => TopicKind::Weather,
            "alerts" => TopicKind::Alerts,
            "command" => TopicKind::Command,
            other => return Err(DecodeError::UnknownKind(other.to_owned())),
        };
        Ok(Self {
            namespace: namespace.to_owned(),
            device_id: device_id.to_owned(),
            kind,
        })
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.namespace,
            self.device_id,
            self.kind.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_recognised_kinds() {
        for (raw, kind) in [
            ("irricore/d1/status", TopicKind::Status),
            ("irricore/d1/weather", TopicKind::Weather),
            ("irricore/d1/alerts", TopicKind::Alerts),
            ("irricore/d1/command", TopicKind::Command),
        ] {
            let topic = Topic::parse(raw).unwrap();
            assert_eq!(topic.kind, kind);
            assert_eq!(topic.device_id, "d1");
            assert_eq!(topic.to_string(), raw);
        }
    }

    #[test]
    fn rejects_malformed_topics() {
        assert!(matches!(
            Topic::parse("irricore/status"),
            Err(DecodeError::Topic(_))
        ));
        assert!(matches!(
            Topic::parse("irricore/d1/status/extra"),
            Err(DecodeError::Topic(_))
        ));
        assert!(matches!(
            Topic::parse("//status"),
            Err(DecodeError::Topic(_))
        ));
    }

    #[test]
    fn rejects_unknown_suffix() {
        assert!(matches!(
            Topic::parse("irricore/d1/firmware"),
            Err(DecodeError::UnknownKind(kind)) if kind == "firmware"
        ));
    }
}
