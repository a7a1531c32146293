//! Depth-first walk over the files of one tree.

use gitfacts_core::{File, FileMode, GitfactsError, ObjectId};
use git2::ObjectType;

use crate::{git_err, object_id, Repository};

/// Files of a tree in path order, descending into subtrees as they appear.
///
/// Submodule entries are skipped; symlinks are reported with
/// [`FileMode::Symlink`].
pub struct TreeFiles<'r> {
    repo: &'r Repository,
    stack: Vec<Frame<'r>>,
}

struct Frame<'r> {
    prefix: String,
    tree: git2::Tree<'r>,
    next: usize,
}

enum Step {
    Pop,
    Entry {
        path: String,
        id: git2::Oid,
        kind: Option<ObjectType>,
        mode: i32,
    },
}

impl<'r> TreeFiles<'r> {
    pub(crate) fn new(repo: &'r Repository, root: git2::Tree<'r>) -> Self {
        Self {
            repo,
            stack: vec![Frame {
                prefix: String::new(),
                tree: root,
                next: 0,
            }],
        }
    }

    fn file(&self, path: String, id: git2::Oid, mode: i32) -> Option<Result<File<'r>, GitfactsError>> {
        let mode = FileMode::from_raw(mode as u32)?;
        Some(object_id(id).map(|blob: ObjectId| File::new(path, blob, mode, self.repo)))
    }
}

impl<'r> Iterator for TreeFiles<'r> {
    type Item = Result<File<'r>, GitfactsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = {
                let frame = self.stack.last_mut()?;
                match frame.tree.get(frame.next) {
                    None => Step::Pop,
                    Some(entry) => {
                        frame.next += 1;
                        let name = String::from_utf8_lossy(entry.name_bytes());
                        let path = if frame.prefix.is_empty() {
                            name.into_owned()
                        } else {
                            format!("{}/{}", frame.prefix, name)
                        };
                        Step::Entry {
                            path,
                            id: entry.id(),
                            kind: entry.kind(),
                            mode: entry.filemode(),
                        }
                    }
                }
            };

            match step {
                Step::Pop => {
                    self.stack.pop();
                }
                Step::Entry {
                    path,
                    id,
                    kind: Some(ObjectType::Tree),
                    ..
                } => match self.repo.inner.find_tree(id) {
                    Ok(tree) => self.stack.push(Frame {
                        prefix: path,
                        tree,
                        next: 0,
                    }),
                    Err(e) => return Some(Err(git_err("failed to read tree")(e))),
                },
                Step::Entry {
                    path,
                    id,
                    kind: Some(ObjectType::Blob),
                    mode,
                } => {
                    if let Some(file) = self.file(path, id, mode) {
                        return Some(file);
                    }
                }
                Step::Entry { .. } => {}
            }
        }
    }
}
