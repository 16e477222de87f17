//! Route paths.

pub const GET_API_VERSION: &str = "/api/version";

pub const POST_API_LOGIN: &str = "/api/login";
pub const POST_API_LOGOUT: &str = "/api/logout";
pub const POST_API_ACCESSTOKEN: &str = "/api/accesstoken";

pub const POST_API_USERS: &str = "/api/users";
pub const API_USERS_ME: &str = "/api/users/me";
pub const POST_API_USERS_ME_PAGEORDER: &str = "/api/users/me/pageorder";
pub const GET_API_USERS_USERNAME: &str = "/api/users/{username}";

pub const GET_API_SESSIONS: &str = "/api/sessions";
pub const DELETE_API_SESSIONS_ID: &str = "/api/sessions/{id}";

pub const API_APITOKEN: &str = "/api/apitoken";

pub const POST_API_PAGES: &str = "/api/pages";
pub const API_PAGES_ID: &str = "/api/pages/{id}";
