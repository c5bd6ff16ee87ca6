// src/lib.rs - Actuator position engine for 3D printer motion
pub mod config;
pub mod motion;
