/// Source names used in logs, metrics and the `strategy` config key
pub const BROWSER_SOURCE: &str = "browser";
pub const MBASIC_SOURCE: &str = "mbasic";

// Hosts the two sources talk to by default
pub const DEFAULT_BROWSER_BASE_URL: &str = "https://www.facebook.com";
pub const DEFAULT_MBASIC_BASE_URL: &str = "https://mbasic.facebook.com";

/// Fallback browser location when nothing else is configured or found on PATH
pub const DEFAULT_CHROME_PATH: &str = "/opt/google/chrome/chrome";
pub const DEFAULT_PROFILE_DIR: &str = "browser-profile";
pub const DEFAULT_CONFIG_FILE: &str = "event-feed.toml";

pub const USERNAME_ENV: &str = "EVENT_FEED_USERNAME";
pub const PASSWORD_ENV: &str = "EVENT_FEED_PASSWORD";

/// Event detail pages live under `/events/<digits>`
pub const EVENT_PATH_PATTERN: &str = r"/events/\d+";

pub const CONTENT_CONTAINER_SELECTOR: &str = r#"div[role="main"]"#;
pub const JSON_LD_CONTENT_TYPE: &str = "application/ld+json";

pub const LOGIN_EMAIL_SELECTOR: &str = r#"input[name="email"]"#;
pub const LOGIN_PASSWORD_SELECTOR: &str = r#"input[name="pass"]"#;
pub const LOGIN_SUBMIT_SELECTOR: &str = r#"button[name="login"]"#;

pub const CONSENT_FORM_BODY: &str = "accept_only_essential=1";

/// Written after content expansion when debug is on
pub const DEBUG_SCREENSHOT_FILE: &str = "debug-screenshot.png";

pub const RUN_CALENDAR_FILE: &str = "calendar.ics";

/// Clicks "See more" when it sits above the "Past events" heading and reports
/// whether the control is still there plus the current anchor count.
pub const REVEAL_MORE_SCRIPT: &str = r#"(() => {
    const container = document.querySelector('div[role="main"]') || document.body;
    const more = document.querySelector('div[aria-label="See more"]');
    const pastEvents = [...document.querySelectorAll("span")].find(
        (el) => el.innerText === "Past events",
    );
    const upcoming = !!more &&
        (!pastEvents || more.getBoundingClientRect().y < pastEvents.getBoundingClientRect().y);
    if (upcoming) more.click();
    return { present: upcoming, anchors: container.querySelectorAll("a").length };
})()"#;

/// Accepts only essential cookies on the consent interstitial if it is showing
pub const DISMISS_CONSENT_SCRIPT: &str = r#"(() => {
    const button = document.querySelector(
        '[data-cookiebanner="accept_only_essential_button"], [data-testid="cookie-policy-manage-dialog-accept-button"]',
    );
    if (button) { button.click(); return true; }
    return false;
})()"#;
