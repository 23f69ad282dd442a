pub use graph::{Edge, EdgeId, Graph, GraphBuilder, NodeId};
pub use network::{
    build_graph, ControlPolicy, IntersectionAttributes, Junction, LaneId, LaneOrd, NetworkConfig,
    Node, Road, RoadClass, RoadGraph, SpawnAttributes,
};
pub use signal::{FlowState, SignalConfig, SignalInterval, SignalPhase, SignalState};
pub use simulation::{step, InvalidNetwork, LaneFlow, SimConfig, SimState};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use validate::{validate_intersection, validate_network, ValidationError};
pub use vehicle::{DriverProfile, Vehicle};

mod graph;
mod network;
mod signal;
mod simulation;
pub mod util;
mod validate;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
