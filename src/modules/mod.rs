pub mod conversation {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod repository_mem;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod message {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod repository_mem;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod receipt {
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod reaction {
    pub mod model;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod typing {
    pub mod tracker;
    pub mod model;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod notifier;
pub mod websocket;
