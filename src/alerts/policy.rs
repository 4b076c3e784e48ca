use crate::error::ConfigError;

/// Default maximum number of alerts admitted per rolling hour
pub const DEFAULT_MAX_PER_HOUR: usize = 100;

/// Who sends alerts, who receives them, and how many may go out per hour
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPolicy {
    from_email: String,
    from_name: String,
    recipients: Vec<String>,
    subject_prefix: String,
    max_per_hour: usize,
}

impl AlertPolicy {
    /// Create a policy with the default hourly limit
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `recipients` is empty or
    /// contains a blank address.
    pub fn new(
        recipients: Vec<String>,
        from_email: impl Into<String>,
        from_name: impl Into<String>,
        subject_prefix: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if recipients.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one recipient address is required".to_string(),
            ));
        }
        if recipients.iter().any(|r| r.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "recipient addresses must not be blank".to_string(),
            ));
        }

        Ok(Self {
            from_email: from_email.into(),
            from_name: from_name.into(),
            recipients,
            subject_prefix: subject_prefix.into(),
            max_per_hour: DEFAULT_MAX_PER_HOUR,
        })
    }

    /// Override the hourly limit
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `max_per_hour` is zero.
    pub fn with_max_per_hour(mut self, max_per_hour: usize) -> Result<Self, ConfigError> {
        if max_per_hour == 0 {
            return Err(ConfigError::ValidationError(
                "max_per_hour must be greater than zero".to_string(),
            ));
        }
        self.max_per_hour = max_per_hour;
        Ok(self)
    }

    pub fn from_email(&self) -> &str {
        &self.from_email
    }

    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn subject_prefix(&self) -> &str {
        &self.subject_prefix
    }

    pub fn max_per_hour(&self) -> usize {
        self.max_per_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = AlertPolicy::new(
            vec!["ops@example.com".to_string()],
            "alerts@example.com",
            "Alerts",
            "[ALERT]",
        )
        .unwrap();

        assert_eq!(policy.max_per_hour(), DEFAULT_MAX_PER_HOUR);
        assert_eq!(policy.recipients(), ["ops@example.com".to_string()]);
        assert_eq!(policy.from_email(), "alerts@example.com");
        assert_eq!(policy.from_name(), "Alerts");
        assert_eq!(policy.subject_prefix(), "[ALERT]");
    }

    #[test]
    fn test_policy_requires_recipients() {
        let result = AlertPolicy::new(Vec::new(), "a@example.com", "A", "");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));

        let result = AlertPolicy::new(vec!["  ".to_string()], "a@example.com", "A", "");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_policy_rejects_zero_limit() {
        let policy =
            AlertPolicy::new(vec!["ops@example.com".to_string()], "a@example.com", "A", "")
                .unwrap();
        assert!(policy.clone().with_max_per_hour(0).is_err());
        assert_eq!(policy.with_max_per_hour(5).unwrap().max_per_hour(), 5);
    }
}
