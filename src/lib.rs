// bitsh: a tiny scripting-language shell interpreter.
//
// The interpreter keeps no syntax tree: statements are executed by walking
// the raw token stream through a repositionable cursor, and untaken
// branches are discarded by structurally skipping their tokens. Macros are
// stored as source text and invoked by redirecting the cursor.

// Public modules
pub mod cursor;
pub mod engine;
pub mod error;
pub mod expr;
pub mod macros;
pub mod repl;
pub mod runner;
pub mod tasks;

// Re-export commonly used items
pub use cursor::{Cursor, Number, Snapshot, Symbol};
pub use engine::Engine;
pub use error::{BitshError, ErrorKind, Span};
pub use macros::MacroStore;
pub use tasks::Scheduler;

// Re-export main functions
pub use repl::start as start_repl;
pub use runner::run;
