pub mod interp;
pub mod normalize;
pub mod orient;
pub mod resample;
pub mod resize;

pub use interp::*;
pub use normalize::*;
pub use orient::*;
pub use resample::*;
pub use resize::*;

pub trait Transform<T> {
    fn apply(&self, target: &T) -> T;

    fn apply_iter(&self, target: impl Iterator<Item = T>) -> impl Iterator<Item = T> {
        target.map(|t| self.apply(&t))
    }
}
