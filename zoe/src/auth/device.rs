//! Device fingerprinting and user-agent classification.
//!
//! A device is identified by the user agent and IP address it logs in from, so the same browser on
//! a new network counts as a new device.

use base64::{Engine as _, engine::general_purpose};

/// Maximum length of a device fingerprint.
pub const DEVICE_ID_LENGTH: usize = 32;

/// Where a request appears to come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub user_agent: String,
    pub ip_address: String,
}

impl DeviceInfo {
    pub fn new(user_agent: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ip_address: ip_address.into(),
        }
    }

    /// Stable fingerprint: base64 of `"{user_agent}:{ip_address}"`, truncated to 32 characters.
    pub fn device_id(&self) -> String {
        let mut encoded = general_purpose::STANDARD.encode(format!("{}:{}", self.user_agent, self.ip_address));
        encoded.truncate(DEVICE_ID_LENGTH);
        encoded
    }

    pub fn browser(&self) -> &'static str {
        parse_browser(&self.user_agent)
    }

    pub fn os(&self) -> &'static str {
        parse_os(&self.user_agent)
    }
}

/// Classify the browser family. Order matters: Chrome user agents also mention Safari.
pub fn parse_browser(user_agent: &str) -> &'static str {
    if user_agent.contains("Chrome") {
        "Chrome"
    } else if user_agent.contains("Firefox") {
        "Firefox"
    } else if user_agent.contains("Safari") {
        "Safari"
    } else {
        "Other"
    }
}

/// Classify the operating system. Order matters: Android user agents also mention Linux.
pub fn parse_os(user_agent: &str) -> &'static str {
    if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Mac") {
        "MacOS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("iOS") {
        "iOS"
    } else {
        "Other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
    const SAFARI_MAC: &str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    #[test]
    fn test_device_id_is_truncated_base64() {
        let device = DeviceInfo::new(CHROME_WINDOWS, "10.0.0.1");
        let id = device.device_id();

        assert_eq!(id.len(), DEVICE_ID_LENGTH);
        let full = general_purpose::STANDARD.encode(format!("{CHROME_WINDOWS}:10.0.0.1"));
        assert!(full.starts_with(&id));
    }

    #[test]
    fn test_short_input_is_not_padded() {
        let device = DeviceInfo::new("ua", "ip");
        assert_eq!(device.device_id(), general_purpose::STANDARD.encode("ua:ip"));
    }

    #[test]
    fn test_device_id_depends_on_ip() {
        let a = DeviceInfo::new("curl/8.0", "10.0.0.1");
        let b = DeviceInfo::new("curl/8.0", "10.0.0.2");
        assert_ne!(a.device_id(), b.device_id());
        assert_eq!(a.device_id(), DeviceInfo::new("curl/8.0", "10.0.0.1").device_id());
    }

    #[test]
    fn test_browser_detection() {
        assert_eq!(parse_browser(CHROME_WINDOWS), "Chrome");
        assert_eq!(parse_browser(SAFARI_MAC), "Safari");
        assert_eq!(parse_browser(FIREFOX_LINUX), "Firefox");
        assert_eq!(parse_browser("curl/8.0"), "Other");
    }

    #[test]
    fn test_os_detection() {
        assert_eq!(parse_os(CHROME_WINDOWS), "Windows");
        assert_eq!(parse_os(SAFARI_MAC), "MacOS");
        assert_eq!(parse_os(FIREFOX_LINUX), "Linux");
        assert_eq!(parse_os("Mozilla/5.0 (Linux; Android 14; Pixel 8)"), "Linux");
        assert_eq!(parse_os("Dalvik/2.1.0 (Android 14)"), "Android");
        assert_eq!(parse_os("MyApp/1.0 iOS/17.2"), "iOS");
        assert_eq!(parse_os("curl/8.0"), "Other");
    }
}
