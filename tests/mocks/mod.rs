pub mod mock_cluster;
pub mod recording_listener;

pub use mock_annotator::MockAnnotator;
pub use mock_cluster::{ClusterCall, MockCluster};
pub use recording_listener::RecordingListener;
