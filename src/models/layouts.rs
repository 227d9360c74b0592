use super::ZoneConfiguration;

/// Normalized screen rectangle, origin at the top-left corner
///
/// `x + width` and `y + height` may exceed 1 by a rounding error; consumers clamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Zone {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Edge zones around the screen, in clockwise order
///
/// The order is: top edge left to right, right edge top to bottom, bottom edge right to left,
/// then left edge bottom to top. Zone colors are index-aligned with this order.
#[derive(Debug, Default, Clone)]
pub struct ZoneLayout {
    zones: Vec<Zone>,
}

impl ZoneLayout {
    pub fn new(config: &ZoneConfiguration) -> Self {
        let mut layout = Self::default();
        layout.generate_zones(config);
        layout
    }

    pub fn generate_zones(&mut self, config: &ZoneConfiguration) {
        let mut zones = Vec::with_capacity(config.total_zone_count() as usize);
        let thickness = config.edge_thickness;

        Self::create_top_zones(config.top_zone_count, thickness, &mut zones);
        Self::create_right_zones(config.right_zone_count, thickness, &mut zones);
        Self::create_bottom_zones(config.bottom_zone_count, thickness, &mut zones);
        Self::create_left_zones(config.left_zone_count, thickness, &mut zones);

        self.zones = zones;
    }

    fn create_top_zones(count: u32, thickness: f32, zones: &mut Vec<Zone>) {
        let step = 1. / count as f32;
        for i in 0..count {
            zones.push(Zone::new(i as f32 * step, 0., step, thickness));
        }
    }

    fn create_right_zones(count: u32, thickness: f32, zones: &mut Vec<Zone>) {
        let step = 1. / count as f32;
        for i in 0..count {
            zones.push(Zone::new(1. - thickness, i as f32 * step, thickness, step));
        }
    }

    fn create_bottom_zones(count: u32, thickness: f32, zones: &mut Vec<Zone>) {
        let step = 1. / count as f32;
        for i in 0..count {
            let x = (1. - (i + 1) as f32 * step).max(0.);
            zones.push(Zone::new(x, 1. - thickness, step, thickness));
        }
    }

    fn create_left_zones(count: u32, thickness: f32, zones: &mut Vec<Zone>) {
        let step = 1. / count as f32;
        for i in 0..count {
            let y = (1. - (i + 1) as f32 * step).max(0.);
            zones.push(Zone::new(0., y, thickness, step));
        }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }
}
