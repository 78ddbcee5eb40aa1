pub mod chunk;
pub mod climate;
pub mod datapack;
pub mod density_function;
pub mod error;
pub mod math;
pub mod noise;
pub mod noise_chunk;
pub mod proto;
pub mod random_state;
pub mod router;
pub mod spline;
pub mod surface;

pub use chunk::{Heightmap, ProtoChunk};
pub use density_function::{DensityFunction, DensityFunctionRef, FunctionContext, SinglePointContext};
pub use error::WorldgenError;
pub use noise_chunk::NoiseChunk;
pub use random_state::RandomState;
pub use router::NoiseRouter;

/// Expands a bare path into a namespaced key, `stone` becomes `minecraft:stone`.
pub fn resource_key(key: &str) -> String {
    if key.contains(':') {
        key.to_string()
    } else {
        format!("minecraft:{key}")
    }
}
