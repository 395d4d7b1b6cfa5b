mod resolver;

pub use resolver::{
    SessionResolver, SESSION_ACTIVITY_KEY, SESSION_ID_KEY, SESSION_TIMEOUT, USER_ID_KEY,
    USER_ID_KEYS, USER_OBJECT_KEYS,
};
