//! Economy and progression core of a merge/clicker game.
//!
//! Pieces are tapped for coins, fused into higher stages, spawned on a timer,
//! and bought from a shop whose prices scale with stage and repeat purchases.
//! Everything lives inside one [`game::GameSession`].

pub mod game;
