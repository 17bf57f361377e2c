pub mod tokens {
    /// Random bytes behind every opaque token (refresh, verification, reset).
    /// Hex-encoded this yields an 80 character string carrying 320 bits.
    pub const OPAQUE_TOKEN_BYTES: usize = 40;

    pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

    pub const REFRESH_COOKIE_PATH: &str = "/api/accounts";
}

pub mod limits {

    pub const MAX_EMAIL_LENGTH: usize = 254;

    pub const MAX_NAME_LENGTH: usize = 100;

    pub const MAX_PASSWORD_LENGTH: usize = 256;
}
