use crux_core::capability::{Capability, CapabilityContext, Operation};
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};

use crate::api::GeocacheSummary;
use crate::geo::{BoundingBox, Region};

/// Geometry handed to the map shell. The shell owns all drawing; the core
/// only ever supplies shapes and markers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MapShape {
    Circle { lat: f64, lng: f64, radius_m: f64 },
    Rect { south: f64, west: f64, north: f64, east: f64 },
}

impl From<&Region> for MapShape {
    fn from(region: &Region) -> Self {
        match region {
            Region::Circle { center, radius_km } => Self::Circle {
                lat: center.lat(),
                lng: center.lng(),
                radius_m: radius_km * 1000.0,
            },
            Region::Box(bbox) => (*bbox).into(),
        }
    }
}

impl From<BoundingBox> for MapShape {
    fn from(bbox: BoundingBox) -> Self {
        Self::Rect {
            south: bbox.south,
            west: bbox.west,
            north: bbox.north,
            east: bbox.east,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MapOperation {
    /// Crosshair pick-mode on or off.
    SetPickCursor { active: bool },
    /// Draw (or replace) the committed region overlay.
    ShowRegion { shape: MapShape },
    ClearRegion,
    /// Live rectangle tracking the pointer between the two corner clicks.
    ShowPreview { shape: MapShape },
    ClearPreview,
    /// Append result markers; ids already on the map are never re-sent.
    AddMarkers { features: FeatureCollection },
    ClearMarkers,
}

impl Operation for MapOperation {
    type Output = ();
}

/// Map rendering surface capability. Fire-and-forget: the shell draws,
/// nothing comes back. Pick clicks and pointer moves re-enter the core as
/// ordinary events.
pub struct MapSurface<Ev> {
    context: CapabilityContext<MapOperation, Ev>,
}

/// Alias used when wiring the capability into `Capabilities` so the derived
/// `Effect` enum names the variant `Map` rather than `MapSurface`.
pub type Map<Ev> = MapSurface<Ev>;

impl<Ev> std::fmt::Debug for MapSurface<Ev> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapSurface").finish_non_exhaustive()
    }
}

impl<Ev> Capability<Ev> for MapSurface<Ev> {
    type Operation = MapOperation;
    type MappedSelf<MappedEv> = MapSurface<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        MapSurface::new(self.context.map_event(f))
    }
}

impl<Ev> MapSurface<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<MapOperation, Ev>) -> Self {
        Self { context }
    }

    fn notify(&self, operation: MapOperation) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(operation).await;
        });
    }

    pub fn set_pick_cursor(&self, active: bool) {
        self.notify(MapOperation::SetPickCursor { active });
    }

    pub fn show_region(&self, shape: MapShape) {
        self.notify(MapOperation::ShowRegion { shape });
    }

    pub fn clear_region(&self) {
        self.notify(MapOperation::ClearRegion);
    }

    pub fn show_preview(&self, shape: MapShape) {
        self.notify(MapOperation::ShowPreview { shape });
    }

    pub fn clear_preview(&self) {
        self.notify(MapOperation::ClearPreview);
    }

    pub fn add_markers(&self, features: FeatureCollection) {
        self.notify(MapOperation::AddMarkers { features });
    }

    pub fn clear_markers(&self) {
        self.notify(MapOperation::ClearMarkers);
    }
}

/// GeoJSON point features for a batch of fresh results, ready for a
/// Leaflet/MapLibre-style shell.
#[must_use]
pub fn marker_features(items: &[GeocacheSummary]) -> FeatureCollection {
    let features = items
        .iter()
        .map(|cache| {
            let mut properties = JsonObject::new();
            if let Some(name) = &cache.name {
                properties.insert("name".into(), name.clone().into());
            }
            if let Some(difficulty) = cache.difficulty {
                properties.insert("difficulty".into(), difficulty.into());
            }
            if let Some(terrain) = cache.terrain {
                properties.insert("terrain".into(), terrain.into());
            }
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![cache.lon, cache.lat]))),
                id: Some(Id::String(cache.id.as_str().to_owned())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
