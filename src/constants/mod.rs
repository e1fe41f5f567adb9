pub struct Env {
    pub jwt_secret: String,
    pub database_url: String,
    pub frontend_url: String,
    pub ip: String,
    pub port: u16,
    pub typing_ttl_ms: u64,
    pub message_tail_limit: i64,
    pub team_name: String,
}

impl Env {
    fn new() -> Self {
        let jwt_secret = std::env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in .env file or environment variable");

        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .expect("PORT must be a valid u16 integer");

        let typing_ttl_ms = std::env::var("TYPING_TTL_MS")
            .unwrap_or_else(|_| "6000".to_string())
            .parse::<u64>()
            .expect("TYPING_TTL_MS must be a valid u64 integer");
        let message_tail_limit = std::env::var("MESSAGE_TAIL_LIMIT")
            .unwrap_or_else(|_| "50".to_string())
            .parse::<i64>()
            .expect("MESSAGE_TAIL_LIMIT must be a valid i64 integer");

        let team_name =
            std::env::var("TEAM_NAME").unwrap_or_else(|_| "Team Chat".to_string());

        Env {
            jwt_secret,
            database_url,
            frontend_url,
            ip,
            port,
            typing_ttl_ms,
            message_tail_limit,
            team_name,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
