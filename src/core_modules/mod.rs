pub mod blob;
pub mod blob_detector;
pub mod capture;
pub mod cell_grid;
pub mod color_sampler;
pub mod consensus;
pub mod frame_assembler;
pub mod frame_codec;
pub mod geometry;
pub mod palette;
pub mod pixel;
pub mod transform;
