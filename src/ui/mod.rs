// UI module - GUI logic and event loop bridge
//
// This module contains:
// - EventLoopBridge: Drains scan results into the Slint event loop
// - GuiController: Main controller that wires up the window with the scanner

pub mod bridge;
pub mod controller;

pub use bridge::EventLoopBridge;
pub use controller::GuiController;
