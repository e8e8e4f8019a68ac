pub const READER_API_URL: &str = "READER_API_URL";
pub const READER_WS_URL: &str = "READER_WS_URL";
pub const READER_SESSION_COOKIE: &str = "READER_SESSION_COOKIE";
pub const READER_CHANNEL_CAPACITY: &str = "READER_CHANNEL_CAPACITY";

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const WS_PATH: &str = "/ws";
pub const SESSIONS_PATH: &str = "/sessions";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub const COOKIE_HEADER: &str = "Cookie";
pub const SESSION_COOKIE_NAME: &str = "session";
