//! Command implementations
//!
//! [`Command`] is the full command surface; [`execute`] is the single
//! dispatcher. Each command produces one JSON value or an [`AxError`].

pub mod act;
pub mod inspect;
pub mod screen;
pub mod session;
pub mod synth;

use crate::address::Address;
use crate::capture::ScreenCapture;
use crate::errors::AxError;
use crate::identity::{ElementRegistry, IdentityEngine};
use crate::input::{InputSink, MouseButton};
use crate::lock::{Launcher, LockCoordinator};
use crate::notify::notify_if_locked;
use crate::resolve::Resolver;
use crate::store::CapabilityStore;
use crate::tree::TreeBuilder;
use clap::Subcommand;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List regular running applications
    Apps,

    /// Print the accessibility tree below an address (default: frontmost application)
    Tree {
        address: Option<String>,
        /// Levels of children to include
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Describe the element an address resolves to
    Find { address: String },

    /// List elements whose frames intersect a region
    Region { address: String },

    /// List the actions an element supports
    Actions { address: String },

    /// Perform a named action such as `press` or `show_menu`
    Action { address: String, name: String },

    /// Set an element's value
    Set { address: String, value: String },

    /// Give an element keyboard focus
    Focus { address: String },

    /// Move a window or element to an absolute `@X,Y` position
    Move { address: String, to: String },

    /// Resize an element to the `+WxH` size carried by the address
    Resize { address: String },

    /// Click at an address
    Click {
        address: String,
        #[arg(long, value_enum, default_value_t)]
        button: MouseButton,
        #[arg(long)]
        double: bool,
    },

    /// Type text, optionally focusing an element first
    Type {
        text: String,
        #[arg(long)]
        into: Option<String>,
    },

    /// Press a key combination such as `cmd+shift+s`
    Key {
        combo: String,
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },

    /// Scroll at an address
    Scroll {
        address: String,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        dx: i32,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        dy: i32,
    },

    /// Drag from one address to another
    Drag {
        from: String,
        to: String,
        #[arg(long, value_enum, default_value_t)]
        button: MouseButton,
    },

    /// Capture the pixels of a region
    Screenshot {
        address: String,
        /// PNG output path (default: a file in the temp directory)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Return the PNG inline as base64
        #[arg(long)]
        base64: bool,
    },

    /// Suppress human input until unlocked, escaped or timed out
    Lock {
        /// Seconds before the lock releases itself (capped at 300)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Release the input lock
    Unlock,

    /// Report whether input is locked
    Status,
}

/// Collaborators a command runs against
pub struct Context<'a, S: CapabilityStore, L: Launcher> {
    pub store: &'a S,
    pub registry: &'a ElementRegistry<S::Handle>,
    pub capture: &'a dyn ScreenCapture,
    pub input: &'a mut dyn InputSink,
    pub lock: &'a LockCoordinator<L>,
}

impl<'a, S: CapabilityStore, L: Launcher> Context<'a, S, L> {
    pub fn identity(&self) -> IdentityEngine<'a, S> {
        IdentityEngine::new(self.store, self.registry)
    }

    pub fn resolver(&self) -> Resolver<'a, S> {
        Resolver::new(self.identity())
    }

    pub fn tree_builder(&self) -> TreeBuilder<'a, S> {
        TreeBuilder::new(self.identity())
    }

    /// Best-effort notice to the suppressor; no-op when unlocked
    pub async fn notify(&self, command: &str, description: &str) {
        notify_if_locked(self.lock, command, description).await;
    }
}

pub fn parse_address(token: &str) -> Result<Address, AxError> {
    token.parse()
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, AxError> {
    serde_json::to_value(value).map_err(|e| AxError::action_failed(format!("failed to serialize result: {}", e)))
}

pub async fn execute<S: CapabilityStore, L: Launcher>(
    command: Command,
    ctx: &mut Context<'_, S, L>,
) -> Result<Value, AxError> {
    tracing::debug!(?command, "executing");
    match command {
        Command::Apps => inspect::apps(ctx),
        Command::Tree { address, depth } => inspect::tree(ctx, address.as_deref(), depth),
        Command::Find { address } => inspect::find(ctx, &address),
        Command::Region { address } => inspect::region(ctx, &address),
        Command::Actions { address } => inspect::actions(ctx, &address),
        Command::Action { address, name } => act::action(ctx, &address, &name).await,
        Command::Set { address, value } => act::set_value(ctx, &address, &value).await,
        Command::Focus { address } => act::focus(ctx, &address).await,
        Command::Move { address, to } => act::move_to(ctx, &address, &to).await,
        Command::Resize { address } => act::resize(ctx, &address).await,
        Command::Click {
            address,
            button,
            double,
        } => synth::click(ctx, &address, button, double).await,
        Command::Type { text, into } => synth::type_text(ctx, &text, into.as_deref()).await,
        Command::Key { combo, repeat } => synth::key(ctx, &combo, repeat).await,
        Command::Scroll { address, dx, dy } => synth::scroll(ctx, &address, dx, dy).await,
        Command::Drag { from, to, button } => synth::drag(ctx, &from, &to, button).await,
        Command::Screenshot {
            address,
            output,
            base64,
        } => screen::screenshot(ctx, &address, output, base64),
        Command::Lock { timeout } => session::lock(ctx, timeout),
        Command::Unlock => session::unlock(ctx),
        Command::Status => session::status(ctx),
    }
}

#[cfg(test)]
pub(crate) mod harness {
    use super::*;
    use crate::capture::SnapshotCapture;
    use crate::input::recording::RecordingSink;
    use crate::lock::testing::ScriptLauncher;
    use crate::snapshot::SnapshotStore;
    use crate::snapshot::fixtures::sample_store;
    use tempfile::TempDir;

    /// Owns everything a [`Context`] borrows
    pub struct Harness {
        pub store: SnapshotStore,
        pub registry: ElementRegistry<<SnapshotStore as CapabilityStore>::Handle>,
        pub capture: SnapshotCapture,
        pub sink: RecordingSink,
        pub lock: LockCoordinator<ScriptLauncher>,
        _dir: TempDir,
    }

    impl Harness {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let lock = LockCoordinator::new(
                dir.path().join("lockd.pid"),
                dir.path().join("axlockd.sock"),
                ScriptLauncher::new("exec sleep 30"),
            );
            Self {
                store: sample_store(),
                registry: ElementRegistry::new(),
                capture: SnapshotCapture::new(None),
                sink: RecordingSink::default(),
                lock,
                _dir: dir,
            }
        }

        pub async fn run(&mut self, command: Command) -> Result<Value, AxError> {
            let mut ctx = Context {
                store: &self.store,
                registry: &self.registry,
                capture: &self.capture,
                input: &mut self.sink,
                lock: &self.lock,
            };
            execute(command, &mut ctx).await
        }

        /// Id of the first element with the given title
        pub fn id_of(&self, title: &str) -> String {
            let engine = IdentityEngine::new(&self.store, &self.registry);
            let tree = TreeBuilder::new(engine)
                .build(&self.store.application(100), None)
                .unwrap();
            find_title(&tree, title).unwrap()
        }

        pub fn id_of_role(&self, role: &str) -> String {
            let engine = IdentityEngine::new(&self.store, &self.registry);
            let tree = TreeBuilder::new(engine)
                .build(&self.store.application(100), None)
                .unwrap();
            find_role(&tree, role).unwrap()
        }
    }

    fn find_title(node: &crate::tree::TreeNode, title: &str) -> Option<String> {
        if node.title.as_deref() == Some(title) {
            return Some(node.id.to_string());
        }
        node.children
            .iter()
            .flatten()
            .find_map(|c| find_title(c, title))
    }

    fn find_role(node: &crate::tree::TreeNode, role: &str) -> Option<String> {
        if node.role == role {
            return Some(node.id.to_string());
        }
        node.children
            .iter()
            .flatten()
            .find_map(|c| find_role(c, role))
    }
}
