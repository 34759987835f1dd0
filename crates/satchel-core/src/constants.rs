/// Route component constants shared across crates
pub const API_ROUTE_COMPONENT: &str = "api";
pub const API_ROUTE_PREFIX: &str = const_str::concat!("/", API_ROUTE_COMPONENT);

pub const CALENDAR_ROUTE_COMPONENT: &str = "calendar";
pub const CALENDAR_ROUTE_PREFIX: &str =
    const_str::concat!(API_ROUTE_PREFIX, "/", CALENDAR_ROUTE_COMPONENT);

pub const SUBJECTS_ROUTE_COMPONENT: &str = "subjects";
pub const SUBJECTS_ROUTE_PREFIX: &str =
    const_str::concat!(API_ROUTE_PREFIX, "/", SUBJECTS_ROUTE_COMPONENT);

/// Header carrying the acting user id, set by the fronting proxy.
pub const ACTING_USER_HEADER: &str = "x-acting-user";
