//! B+Tree index implementation
//!

// Re-export
pub use self::otley::Direction;
pub use self::otley::Otley;
pub use self::otley::OtleyError;
pub use self::page::expected_data_page_capacity;
pub use self::page::expected_index_page_capacity;
pub use self::page::OtleyKey;
pub use self::page::OtleyRecord;
pub use self::page::PageError;
pub use self::property::Property;
pub use self::property::PropertyError;
pub use self::property::RootKind;

pub mod otley;
mod page;
mod property;
mod stream;
