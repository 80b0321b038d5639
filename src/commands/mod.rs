// Register application subcommands.
// Each module corresponds to a top-level devrig command-line action.

// Reconciles declared resources against persisted state and executes.
pub mod apply;
// Pure dry-run: what `apply` would do, without touching anything.
pub mod plan;
// Displays the version of devrig.
pub mod version;
