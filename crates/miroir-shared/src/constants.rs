/// Maximum number of non-deleted labels an account may hold.
pub const MAX_ACTIVE_LABELS: usize = 20;

/// Sentinel carried by a contact update whose profile image was removed.
pub const IMG_URL_REMOVED: &str = "removed";

/// Sentinel carried by a contact update whose profile image changed and
/// must be re-fetched from the socket.
pub const IMG_URL_CHANGED: &str = "changed";

/// Default capacity of the event bus broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// Width of the zero-padded pin rank inside a chat sort key.
pub const SORT_KEY_PIN_WIDTH: usize = 10;

/// Width of the zero-padded conversation timestamp inside a chat sort key.
pub const SORT_KEY_TIMESTAMP_WIDTH: usize = 15;
