//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements       | Connects to                 |
//! |------------|------------------|-----------------------------|
//! | `log_sink` | EventSink        | `log` facade                |
//! | `prefs`    | PreferenceStore  | in-memory key/value map     |
//! | `time`     | TimeSource       | system wall clock (UTC)     |
//! | `radio`    | RadioPort        | in-memory transaction queue |

pub mod log_sink;
pub mod prefs;
pub mod radio;
pub mod time;
