pub mod map;

pub use self::map::{marker_features, Map, MapOperation, MapShape, MapSurface};

// We use Crux's built-in Render, Http and KeyValue capabilities directly;
// the map surface is the one capability this app has to bring itself.
pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::KeyValue;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub render: Render<Event>,
    pub http: Http<Event>,
    pub key_value: KeyValue<Event>,
    pub map: Map<Event>,
}
