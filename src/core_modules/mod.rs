pub mod edge_extractor;
pub mod gmm;
pub mod grab_cut;
pub mod graph_cut;
pub mod grid;
pub mod image_loader;
#[cfg(feature = "opencv")]
pub mod opencv_engine;
pub mod score_aggregator;
pub mod segmenter;
