use std::sync::Arc;
use strata::{
    Backend, ForkGroup, LeafTie, MemoryBackend, NibblePath, Options, Payload, Vertex, VertexId,
    VertexKind, View, ViewId,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const ENV_NAME: &str = "STRATA_LOG";

/// Install a log subscriber filtered by `STRATA_LOG`. Safe to call from every test.
pub fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(ENV_NAME)
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn nibbles(nibbles: &[u8]) -> NibblePath {
    NibblePath::from_nibbles(nibbles).unwrap()
}

/// A full 64-nibble path derived from `id`.
pub fn account_path(id: u64) -> NibblePath {
    // Paths should be spread out, but we don't want to spend time on a good hash. So the next
    // best option is to use a PRNG seeded with the id.
    use rand::{RngCore as _, SeedableRng as _};
    let mut seed = [0; 16];
    seed[0..8].copy_from_slice(&id.to_le_bytes());
    let mut rng = rand_pcg::Lcg64Xsh32::from_seed(seed);
    let mut key = [0u8; 32];
    rng.fill_bytes(&mut key);
    NibblePath::from_key(&key)
}

/// A 4-nibble path, so that small key sets share long prefixes.
pub fn short_path(id: u16) -> NibblePath {
    nibbles(&[
        (id >> 12) as u8 & 0x0f,
        (id >> 8) as u8 & 0x0f,
        (id >> 4) as u8 & 0x0f,
        id as u8 & 0x0f,
    ])
}

pub fn value(id: u64) -> Payload {
    Payload::Raw(blake3::hash(&id.to_le_bytes()).as_bytes()[..8].to_vec())
}

/// Build the canonical trie holding `entries` below `root`, recording every leaf in the view's
/// leaf-path table. Paths must be distinct and of equal length.
pub fn build_trie(view: &mut View, root: VertexId, entries: &[(NibblePath, Payload)]) {
    let mut entries = entries.to_vec();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    if !entries.is_empty() {
        build(view, root, root, 0, &entries);
    }
}

fn build(
    view: &mut View,
    root: VertexId,
    vid: VertexId,
    depth: usize,
    entries: &[(NibblePath, Payload)],
) {
    if let [(path, payload)] = entries {
        let leaf = Vertex::Leaf {
            prefix: path.skip(depth),
            payload: payload.clone(),
        };
        view.put_vertex(vid, Some(leaf)).unwrap();
        view.put_leaf_vid(
            LeafTie {
                root,
                path: path.clone(),
            },
            vid,
        );
        return;
    }

    // entries are sorted, so the shared prefix is the one of the first and last entries.
    let first = &entries[0].0;
    let last = &entries[entries.len() - 1].0;
    let mut common = 0;
    while first.get(depth + common).is_some()
        && first.get(depth + common) == last.get(depth + common)
    {
        common += 1;
    }
    if common > 0 {
        let prefix = nibbles(&first.as_slice()[depth..depth + common]);
        let child = view.new_vid();
        view.put_vertex(vid, Some(Vertex::Extension { prefix, child }))
            .unwrap();
        build(view, root, child, depth + common, entries);
        return;
    }

    let mut children = Vec::new();
    let mut start = 0;
    while start < entries.len() {
        let nibble = entries[start].0.get(depth).unwrap();
        let len = entries[start..]
            .iter()
            .take_while(|(path, _)| path.get(depth) == Some(nibble))
            .count();
        let child = view.new_vid();
        build(view, root, child, depth + 1, &entries[start..start + len]);
        children.push((nibble, child));
        start += len;
    }
    view.put_vertex(vid, Some(Vertex::branch(children))).unwrap();
}

/// The structure of a trie with vertex IDs erased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Branch(Vec<(u8, Shape)>),
    Extension(NibblePath, Box<Shape>),
    Leaf(NibblePath, Payload),
}

pub fn shape(view: &View, vid: VertexId) -> Option<Shape> {
    let vertex = view.get_vertex(vid).unwrap()?;
    Some(match vertex {
        Vertex::Branch { children } => Shape::Branch(
            children
                .iter()
                .enumerate()
                .filter(|(_, child)| child.is_valid())
                .map(|(nibble, child)| (nibble as u8, shape(view, *child).expect("dangling child")))
                .collect(),
        ),
        Vertex::Extension { prefix, child } => {
            Shape::Extension(prefix, Box::new(shape(view, child).expect("dangling child")))
        }
        Vertex::Leaf { prefix, payload } => Shape::Leaf(prefix, payload),
    })
}

/// Check that no branch below `vid` has fewer than two children and that every extension sits
/// on top of a branch.
pub fn assert_canonical(view: &View, vid: VertexId) {
    let Some(vertex) = view.get_vertex(vid).unwrap() else {
        return;
    };
    match vertex {
        Vertex::Branch { .. } => {
            let children = vertex.children();
            assert!(
                children.len() >= 2,
                "branch {} has {} children",
                vid,
                children.len()
            );
            for child in children {
                assert_canonical(view, child);
            }
        }
        Vertex::Extension { ref prefix, child } => {
            assert!(!prefix.is_empty(), "empty extension {}", vid);
            let below = view.get_vertex(child).unwrap().expect("dangling child");
            assert_eq!(below.kind(), VertexKind::Branch, "extension {} over non-branch", vid);
            assert_canonical(view, child);
        }
        Vertex::Leaf { .. } => {}
    }
}

/// Resolve `path` below `root` and delete the leaf there.
pub fn delete_path(view: &mut View, root: VertexId, path: &NibblePath) -> strata::Result<()> {
    let hike = view.hike(root, path)?;
    let tie = LeafTie {
        root,
        path: path.clone(),
    };
    view.delete(&hike, &tie)
}

pub struct Test {
    pub group: ForkGroup,
    pub backend: Arc<MemoryBackend>,
}

#[allow(dead_code)]
impl Test {
    pub fn new() -> Self {
        Self::with_options(Options::new())
    }

    pub fn with_options(options: Options) -> Self {
        init_logging();
        let backend = Arc::new(MemoryBackend::new());
        let shared: Arc<dyn Backend> = backend.clone();
        let group = ForkGroup::new(Some(shared), options).unwrap();
        Self { group, backend }
    }

    pub fn centre(&self) -> ViewId {
        self.group.centre()
    }

    pub fn view(&self, id: ViewId) -> &View {
        self.group.view(id).unwrap()
    }

    pub fn view_mut(&mut self, id: ViewId) -> &mut View {
        self.group.view_mut(id).unwrap()
    }

    pub fn fork(&mut self, id: ViewId) -> ViewId {
        self.group.fork(id).unwrap()
    }

    pub fn build(&mut self, id: ViewId, root: VertexId, entries: &[(NibblePath, Payload)]) {
        build_trie(self.view_mut(id), root, entries);
    }

    pub fn delete(&mut self, id: ViewId, root: VertexId, path: &NibblePath) -> strata::Result<()> {
        delete_path(self.view_mut(id), root, path)
    }

    pub fn read(&self, id: ViewId, vid: VertexId) -> Option<Vertex> {
        self.view(id).get_vertex(vid).unwrap()
    }

    pub fn persist(&mut self, id: ViewId) -> strata::Result<()> {
        self.group.persist(id, None, false)
    }
}
