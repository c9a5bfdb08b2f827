//! Attach-table report
//!
//! A text view of every mapping in the mount cache, across all users.
//! Mappings that share a name and target are folded into one row whose
//! user column lists every holder, in braces when there is more than one:
//!
//! ```text
//! sipb                    /afs/sipb               {alice,bob}         nosuid
//! ```
//!
//! The legacy style adds a header and lists rows in the order they were
//! first attached instead of by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::identity::IdentityResolver;
use crate::mounts::{MountCache, MountRecord};
use crate::synthetic::SyntheticContent;

/// Default file name of the plain report
pub const ATTACHTAB_NAME: &str = ".attachtab";

/// Default file name of the legacy report
pub const LEGACY_ATTACHTAB_NAME: &str = ".attachtab.legacy";

/// Mode column; links are always handed out nosuid
pub const MOUNT_MODE: &str = "nosuid";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Style {
    Plain,
    Legacy,
}

/// One folded `(name, target)` mapping
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachRow {
    pub name: String,
    pub target: String,
    /// Display names, sorted and de-duplicated
    pub users: Vec<String>,
    /// Insertion sequence of the oldest mapping in the group
    pub first_seq: u64,
}

impl AttachRow {
    fn users_column(&self) -> String {
        if self.users.len() > 1 {
            format!("{{{}}}", self.users.join(","))
        } else {
            self.users.join(",")
        }
    }
}

/// Fold mount records into rows sorted by name, then target
pub fn collect(records: &[MountRecord], identities: &dyn IdentityResolver) -> Vec<AttachRow> {
    let mut groups: BTreeMap<(&str, &str), (Vec<String>, u64)> = BTreeMap::new();
    for rec in records {
        let group = groups
            .entry((rec.name.as_str(), rec.target.as_str()))
            .or_insert_with(|| (Vec::new(), rec.seq));
        group.0.push(identities.display_name(rec.uid));
        group.1 = group.1.min(rec.seq);
    }

    groups
        .into_iter()
        .map(|((name, target), (mut users, first_seq))| {
            users.sort();
            users.dedup();
            AttachRow {
                name: name.to_string(),
                target: target.to_string(),
                users,
                first_seq,
            }
        })
        .collect()
}

fn render_row(out: &mut String, name: &str, target: &str, users: &str, mode: &str) {
    out.push_str(&format!("{:<23} {:<23} {:<19} {}\n", name, target, users, mode));
}

/// Render rows in the requested style
pub fn render(rows: &[AttachRow], style: Style) -> String {
    let mut out = String::new();
    match style {
        Style::Plain => {
            for row in rows {
                render_row(&mut out, &row.name, &row.target, &row.users_column(), MOUNT_MODE);
            }
        }
        Style::Legacy => {
            render_row(&mut out, "locker", "target", "users", "mode");
            let mut ordered: Vec<&AttachRow> = rows.iter().collect();
            ordered.sort_by_key(|row| row.first_seq);
            for row in ordered {
                render_row(&mut out, &row.name, &row.target, &row.users_column(), MOUNT_MODE);
            }
        }
    }
    out
}

/// Render the current contents of `mounts`
pub fn report(mounts: &MountCache, identities: &dyn IdentityResolver, style: Style) -> String {
    render(&collect(&mounts.all_entries(), identities), style)
}

/// Synthetic content that renders a fresh report on every read
pub fn generator(
    mounts: Arc<MountCache>,
    identities: Arc<dyn IdentityResolver>,
    style: Style,
) -> SyntheticContent {
    SyntheticContent::generated(move || report(&mounts, identities.as_ref(), style).into_bytes())
}
