mod strings;

pub use self::strings::{
    expand_env, expand_env_with, read_null_terminated_ansi_string,
    read_null_terminated_utf16_string,
};
