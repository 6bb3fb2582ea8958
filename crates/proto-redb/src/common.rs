/// Status is the machine-readable tag carried by every response envelope,
/// alongside the free-form human message.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    prost::Enumeration,
)]
#[repr(i32)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Unspecified = 0,
    Success = 1,
    Error = 2,
    Pending = 3,
    Created = 4,
    Updated = 5,
    Deleted = 6,
    Connected = 7,
    Disconnected = 8,
}

impl Status {
    /// String name of the enum value, in the `STATUS_*` wire convention.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Status::Unspecified => "STATUS_UNSPECIFIED",
            Status::Success => "STATUS_SUCCESS",
            Status::Error => "STATUS_ERROR",
            Status::Pending => "STATUS_PENDING",
            Status::Created => "STATUS_CREATED",
            Status::Updated => "STATUS_UPDATED",
            Status::Deleted => "STATUS_DELETED",
            Status::Connected => "STATUS_CONNECTED",
            Status::Disconnected => "STATUS_DISCONNECTED",
        }
    }

    pub fn from_str_name(value: &str) -> Option<Self> {
        match value {
            "STATUS_UNSPECIFIED" => Some(Status::Unspecified),
            "STATUS_SUCCESS" => Some(Status::Success),
            "STATUS_ERROR" => Some(Status::Error),
            "STATUS_PENDING" => Some(Status::Pending),
            "STATUS_CREATED" => Some(Status::Created),
            "STATUS_UPDATED" => Some(Status::Updated),
            "STATUS_DELETED" => Some(Status::Deleted),
            "STATUS_CONNECTED" => Some(Status::Connected),
            "STATUS_DISCONNECTED" => Some(Status::Disconnected),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Status;

    #[test]
    fn status_names_round_trip() {
        for status in [
            Status::Success,
            Status::Error,
            Status::Pending,
            Status::Created,
            Status::Updated,
            Status::Deleted,
            Status::Connected,
            Status::Disconnected,
        ] {
            assert_eq!(Status::from_str_name(status.as_str_name()), Some(status));
        }
        assert_eq!(Status::from_str_name("STATUS_BOGUS"), None);
    }
}
