use super::{Backend, SavedState, WriteBatch};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use strata_core::{HashLabel, IdGen, Vertex, VertexId};

/// A backend keeping everything in memory.
///
/// Used by tests and as the reference for other backends. Commits can be made to fail on demand
/// with [`MemoryBackend::fail_next_commit`].
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    vertices: FxHashMap<VertexId, Vertex>,
    labels: FxHashMap<VertexId, HashLabel>,
    id_gen: IdGen,
    saved_state: Option<SavedState>,
    commits: u64,
    fail_next_commit: bool,
}

/// An ordered snapshot of a [`MemoryBackend`], for comparing backend states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDump {
    pub vertices: BTreeMap<VertexId, Vertex>,
    pub labels: BTreeMap<VertexId, HashLabel>,
    pub id_gen: IdGen,
    pub saved_state: Option<SavedState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call to [`Backend::end_batch`] fail without applying anything.
    pub fn fail_next_commit(&self) {
        self.tables.lock().fail_next_commit = true;
    }

    /// The number of batches applied so far.
    pub fn commits(&self) -> u64 {
        self.tables.lock().commits
    }

    pub fn dump(&self) -> MemoryDump {
        let tables = self.tables.lock();
        MemoryDump {
            vertices: tables
                .vertices
                .iter()
                .map(|(vid, vertex)| (*vid, vertex.clone()))
                .collect(),
            labels: tables
                .labels
                .iter()
                .map(|(vid, label)| (*vid, *label))
                .collect(),
            id_gen: tables.id_gen.clone(),
            saved_state: tables.saved_state,
        }
    }
}

impl Backend for MemoryBackend {
    fn get_vertex(&self, vid: VertexId) -> anyhow::Result<Option<Vertex>> {
        Ok(self.tables.lock().vertices.get(&vid).cloned())
    }

    fn get_label(&self, vid: VertexId) -> anyhow::Result<Option<HashLabel>> {
        Ok(self.tables.lock().labels.get(&vid).copied())
    }

    fn get_id_gen(&self) -> anyhow::Result<IdGen> {
        Ok(self.tables.lock().id_gen.clone())
    }

    fn get_saved_state(&self) -> anyhow::Result<Option<SavedState>> {
        Ok(self.tables.lock().saved_state)
    }

    fn end_batch(&self, batch: WriteBatch) -> anyhow::Result<()> {
        let mut tables = self.tables.lock();
        if std::mem::take(&mut tables.fail_next_commit) {
            anyhow::bail!("injected commit failure");
        }

        let WriteBatch {
            vertices,
            labels,
            id_gen,
            saved_state,
        } = batch;
        for (vid, vertex) in vertices {
            match vertex {
                Some(vertex) => {
                    tables.vertices.insert(vid, vertex);
                }
                None => {
                    tables.vertices.remove(&vid);
                }
            }
        }
        for (vid, label) in labels {
            match label {
                Some(label) => {
                    tables.labels.insert(vid, label);
                }
                None => {
                    tables.labels.remove(&vid);
                }
            }
        }
        if let Some(id_gen) = id_gen {
            tables.id_gen = id_gen;
        }
        if saved_state.is_some() {
            tables.saved_state = saved_state;
        }
        tables.commits += 1;
        Ok(())
    }
}
