//! Screens.
//!
//! Screen geometry comes from the display collaborator; this module only
//! wraps the result as `screen` objects. Each screen has its own instance
//! signals (`"property::workarea"`, `"tag::attach"`, ...).

use std::collections::BTreeMap;

use mosaic_core::{
    Allocator, Bridge, BridgeError, BridgeResult, ClassId, ClassSpec, ObjectId, PropertyDescriptor,
    Token, Value,
};

pub const SCREEN_CLASS: &str = "screen";

const INDEX: Token = Token::from_static("index");
const GEOMETRY: Token = Token::from_static("geometry");
const WORKAREA: Token = Token::from_static("workarea");

/// A rectangle in root window coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Area {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Area {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The area as a `{x, y, width, height}` table.
    pub fn to_value(self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("x".to_owned(), Value::from(i64::from(self.x)));
        map.insert("y".to_owned(), Value::from(i64::from(self.y)));
        map.insert("width".to_owned(), Value::from(self.width));
        map.insert("height".to_owned(), Value::from(self.height));
        Value::Map(map)
    }

    /// Parse a `{x, y, width, height}` table. Missing fields are zero.
    pub fn from_value(value: &Value) -> BridgeResult<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| BridgeError::type_mismatch("area", "table", value.type_name()))?;
        let field = |name: &str| -> BridgeResult<f64> {
            map.get(name).map_or(Ok(0.0), |v| v.expect_number(name))
        };
        let width = field("width")?;
        let height = field("height")?;
        if width < 0.0 || height < 0.0 {
            return Err(BridgeError::type_mismatch("area", "non-negative size", "negative number"));
        }
        Ok(Self {
            x: field("x")? as i32,
            y: field("y")? as i32,
            width: width as u32,
            height: height as u32,
        })
    }
}

/// Native data of a `screen` object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Screen {
    /// Zero-based position in the screen list.
    pub index: usize,
    pub geometry: Area,
    /// The geometry minus struts reserved by panels.
    pub workarea: Area,
}

/// Define the `screen` class.
pub fn define_screen_class(bridge: &mut Bridge) -> BridgeResult<ClassId> {
    let class = bridge.define_class(ClassSpec::new(SCREEN_CLASS, Allocator::default_of::<Screen>()))?;
    bridge.define_property(
        class,
        // Scripts count screens from one.
        PropertyDescriptor::new(INDEX)
            .getter(|bridge, id| Ok(Value::from(bridge.entity::<Screen>(id)?.index as i64 + 1))),
    )?;
    bridge.define_property(
        class,
        PropertyDescriptor::new(GEOMETRY)
            .getter(|bridge, id| Ok(bridge.entity::<Screen>(id)?.geometry.to_value())),
    )?;
    bridge.define_property(
        class,
        PropertyDescriptor::new(WORKAREA)
            .getter(|bridge, id| Ok(bridge.entity::<Screen>(id)?.workarea.to_value()))
            .setter(|bridge, id, value| {
                let area = Area::from_value(&value)?;
                let screen = bridge.entity_mut::<Screen>(id)?;
                if screen.workarea == area {
                    return Ok(());
                }
                screen.workarea = area;
                bridge.notify_property(id, &WORKAREA)
            }),
    )?;
    Ok(class)
}

/// The screen objects, in index order.
#[derive(Debug, Clone)]
pub struct Screens {
    class: ClassId,
    screens: Vec<ObjectId>,
}

impl Screens {
    pub fn new(class: ClassId) -> Self {
        Self {
            class,
            screens: Vec::new(),
        }
    }

    /// Replace the screen list with one screen per geometry.
    ///
    /// Old screens are released and destroyed. Each new screen starts with
    /// its workarea equal to its geometry. If an old screen could not be
    /// destroyed, the new list is still built and the first such error is
    /// returned afterwards.
    pub fn scan(&mut self, bridge: &mut Bridge, geometries: &[Area]) -> BridgeResult<()> {
        let mut teardown = Ok(());
        for id in self.screens.drain(..) {
            bridge.release(id);
            if let Err(err) = bridge.destroy(id) {
                tracing::warn!(target: "mosaic::screen", ?id, %err, "old screen already gone");
                if teardown.is_ok() {
                    teardown = Err(err);
                }
            }
        }
        for (index, &geometry) in geometries.iter().enumerate() {
            let id = bridge.insert(
                self.class,
                Screen {
                    index,
                    geometry,
                    workarea: geometry,
                },
            )?;
            bridge.reference_object(id)?;
            self.screens.push(id);
        }
        tracing::debug!(target: "mosaic::screen", count = self.screens.len(), "screens scanned");
        teardown
    }

    pub fn count(&self) -> usize {
        self.screens.len()
    }

    /// The screen at a zero-based index.
    pub fn get(&self, index: usize) -> Option<ObjectId> {
        self.screens.get(index).copied()
    }

    /// The screen containing a point, falling back to the first screen.
    pub fn at_point(&self, bridge: &Bridge, x: i32, y: i32) -> Option<ObjectId> {
        self.screens
            .iter()
            .copied()
            .find(|&id| {
                bridge.entity::<Screen>(id).is_ok_and(|screen| {
                    let g = screen.geometry;
                    x >= g.x
                        && y >= g.y
                        && i64::from(x) < i64::from(g.x) + i64::from(g.width)
                        && i64::from(y) < i64::from(g.y) + i64::from(g.height)
                })
            })
            .or_else(|| self.get(0))
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.screens.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{Callback, ErrorKind, SignalTarget};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn scanned() -> (Bridge, Screens) {
        let mut bridge = Bridge::new();
        let class = define_screen_class(&mut bridge).unwrap();
        bridge.seal();
        let mut screens = Screens::new(class);
        screens
            .scan(
                &mut bridge,
                &[Area::new(0, 0, 1920, 1080), Area::new(1920, 0, 1280, 1024)],
            )
            .unwrap();
        (bridge, screens)
    }

    #[test]
    fn test_scan_creates_referenced_screens() {
        let (mut bridge, screens) = scanned();
        assert_eq!(screens.count(), 2);
        let second = screens.get(1).unwrap();
        assert_eq!(bridge.ref_count(second), 1);
        assert_eq!(bridge.get(second, "index").unwrap(), Value::Number(2.0));
        assert_eq!(
            Area::from_value(&bridge.get(second, "geometry").unwrap()).unwrap(),
            Area::new(1920, 0, 1280, 1024)
        );
    }

    #[test]
    fn test_rescan_retires_old_screens() {
        let (mut bridge, mut screens) = scanned();
        let old = screens.get(0).unwrap();
        screens.scan(&mut bridge, &[Area::new(0, 0, 800, 600)]).unwrap();
        assert!(!bridge.contains(old));
        assert_eq!(bridge.ref_count(old), 0);
        assert_eq!(screens.count(), 1);
    }

    #[test]
    fn test_rescan_finishes_teardown_after_error() {
        let (mut bridge, mut screens) = scanned();
        let first = screens.get(0).unwrap();
        let second = screens.get(1).unwrap();
        bridge.destroy(first).unwrap();

        let err = screens
            .scan(&mut bridge, &[Area::new(0, 0, 800, 600)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Reference);
        assert_eq!(bridge.ref_count(first), 0);
        assert_eq!(bridge.ref_count(second), 0);
        assert!(!bridge.contains(second));
        assert_eq!(screens.count(), 1);
        assert_eq!(bridge.registered_count(), 1);
    }

    #[test]
    fn test_geometry_is_read_only() {
        let (mut bridge, screens) = scanned();
        let first = screens.get(0).unwrap();
        let err = bridge
            .set(first, "geometry", Area::default().to_value())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Attribute);
    }

    #[test]
    fn test_workarea_change_notifies() {
        let (mut bridge, screens) = scanned();
        let first = screens.get(0).unwrap();
        let hits = Arc::new(Mutex::new(0));
        let hits_clone = hits.clone();
        bridge
            .add_signal(
                SignalTarget::Object(first),
                "property::workarea",
                Callback::new(move |_, _| {
                    *hits_clone.lock() += 1;
                    Ok(())
                }),
            )
            .unwrap();

        let panel_free = Area::new(0, 24, 1920, 1056);
        bridge.set(first, "workarea", panel_free.to_value()).unwrap();
        bridge.set(first, "workarea", panel_free.to_value()).unwrap();

        assert_eq!(*hits.lock(), 1);
        assert_eq!(bridge.entity::<Screen>(first).unwrap().workarea, panel_free);
    }

    #[test]
    fn test_at_point() {
        let (bridge, screens) = scanned();
        assert_eq!(screens.at_point(&bridge, 2000, 10), screens.get(1));
        assert_eq!(screens.at_point(&bridge, 10, 10), screens.get(0));
        assert_eq!(screens.at_point(&bridge, -50, -50), screens.get(0));
    }

    #[test]
    fn test_area_rejects_bad_tables() {
        assert_eq!(Area::from_value(&Value::from(3.0)).unwrap_err().kind(), ErrorKind::Type);
        let mut map = BTreeMap::new();
        map.insert("width".to_owned(), Value::from(-5.0));
        assert!(Area::from_value(&Value::Map(map)).is_err());
    }
}
