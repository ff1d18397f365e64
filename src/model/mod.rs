mod commit;
mod history;
mod id;
mod install;
mod release;

pub use commit::{CommitMeta, EntryKind, MODE_BLOB, MODE_TREE, NewCommit, Signature, Timestamp, TreeEntry};
pub use history::{Correlation, Linkage, Subhistory, collapse_runs};
pub use id::ObjectId;
pub use install::{CommitSurvey, Install, InstallKind, ROOT_PATH, child_path};
pub use release::{ReleaseRecord, Version};
