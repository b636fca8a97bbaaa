//! Aspect-preserving render surface sizing.

use crate::backend::SurfaceSize;

/// Render surface size derived from media and container dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceGeometry {
    pub width: u32,
    pub height: u32,
}

/// Placement of the render surface inside its container, top-left origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SurfaceGeometry {
    /// Largest surface with the media's aspect ratio that fits the container.
    ///
    /// Returns `None` when either size is degenerate.
    pub fn fit(media: SurfaceSize, container: SurfaceSize) -> Option<Self> {
        if media.is_empty() || container.is_empty() {
            return None;
        }

        let media_aspect = f64::from(media.width) / f64::from(media.height);
        let container_aspect = f64::from(container.width) / f64::from(container.height);
        let (width, height) = if media_aspect > container_aspect {
            let width = f64::from(container.width);
            (width, width / media_aspect)
        } else {
            let height = f64::from(container.height);
            (height * media_aspect, height)
        };

        Some(Self {
            width: to_pixels(width).min(container.width),
            height: to_pixels(height).min(container.height),
        })
    }

    pub fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, self.height)
    }

    /// Centres the surface inside `container`.
    pub fn letterbox(&self, container: SurfaceSize) -> Viewport {
        let width = self.width.min(container.width);
        let height = self.height.min(container.height);
        Viewport {
            x: (container.width - width) / 2,
            y: (container.height - height) / 2,
            width,
            height,
        }
    }
}

impl Viewport {
    /// Viewport covering the whole of `size`.
    pub fn full(size: SurfaceSize) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
        }
    }

    /// Maps a container-space position (top-left origin) to surface space with
    /// a bottom-left origin, the convention fragment programs expect.
    pub fn to_surface_coords(&self, x: f64, y: f64) -> [f32; 2] {
        let local_x = x - f64::from(self.x);
        let local_y = y - f64::from(self.y);
        [local_x as f32, (f64::from(self.height) - local_y) as f32]
    }
}

fn to_pixels(value: f64) -> u32 {
    value.round().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(media: (u32, u32), container: (u32, u32)) -> Option<SurfaceGeometry> {
        SurfaceGeometry::fit(
            SurfaceSize::new(media.0, media.1),
            SurfaceSize::new(container.0, container.1),
        )
    }

    #[test]
    fn wide_media_fills_container_width() {
        let geometry = fit((1920, 1080), (800, 600)).unwrap();
        assert_eq!((geometry.width, geometry.height), (800, 450));
    }

    #[test]
    fn tall_media_fills_container_height() {
        let geometry = fit((600, 1200), (800, 600)).unwrap();
        assert_eq!((geometry.width, geometry.height), (300, 600));
    }

    #[test]
    fn matching_aspect_fills_container() {
        let geometry = fit((400, 300), (800, 600)).unwrap();
        assert_eq!((geometry.width, geometry.height), (800, 600));
    }

    #[test]
    fn never_exceeds_container() {
        for media in [(1, 1000), (1000, 1), (333, 777), (4096, 2160)] {
            let geometry = fit(media, (641, 479)).unwrap();
            assert!(geometry.width <= 641 && geometry.height <= 479, "{media:?}");
            assert!(geometry.width >= 1 && geometry.height >= 1);
        }
    }

    #[test]
    fn degenerate_sizes_produce_nothing() {
        assert!(fit((0, 1080), (800, 600)).is_none());
        assert!(fit((1920, 1080), (800, 0)).is_none());
    }

    #[test]
    fn letterbox_centres_surface() {
        let geometry = fit((1920, 1080), (800, 600)).unwrap();
        let viewport = geometry.letterbox(SurfaceSize::new(800, 600));
        assert_eq!(
            viewport,
            Viewport {
                x: 0,
                y: 75,
                width: 800,
                height: 450
            }
        );
    }

    #[test]
    fn pointer_maps_to_bottom_left_origin() {
        let viewport = Viewport {
            x: 0,
            y: 75,
            width: 800,
            height: 450,
        };
        assert_eq!(viewport.to_surface_coords(10.0, 75.0), [10.0, 450.0]);
        assert_eq!(viewport.to_surface_coords(10.0, 525.0), [10.0, 0.0]);
    }
}
