//! Named function/derivative pairs consumed by the layers and the trainer.

pub mod activation;
pub mod loss;
