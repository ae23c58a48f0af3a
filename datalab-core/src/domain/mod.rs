pub mod key;
pub mod symbol;
pub mod table;
pub mod tz;

pub use key::{infer_frequency, Axis, ColumnKey, Frequency, KeyKind, RowKey};
pub use symbol::{Symbol, SymbolMap};
pub use table::{nan_eq, range_index, Layout, RawTable, RawValues, SymbolTable};
pub use tz::TimeZoneSpec;
