use crate::bvh::packet::PACKET_SIZE;
use crate::bvh::Bvh;
use crate::objects::Hittable;
use crate::types::ray::Ray;
use crate::types::vector::BVH_FAR;
use indicatif::ParallelProgressIterator;
use na::{Point3, Vector3};
use rayon::prelude::*;
use std::cmp;

/// Pixels per packet side: 4x4 tiles of 4x4 rays.
pub const TILE: u32 = 16;

/// Pinhole camera that produces primary rays and ray packets.
#[derive(Clone, Debug)]
pub struct Camera {
    image_width: u32,
    image_height: u32,
    center: Point3<f32>,
    pixel00: Point3<f32>,
    pixel_du: Vector3<f32>,
    pixel_dv: Vector3<f32>,
}

impl Camera {
    pub fn new(
        aspect_ratio: f32,
        image_width: u32,
        vfov: f32,
        look_from: Point3<f32>,
        look_at: Point3<f32>,
    ) -> Self {
        let image_width = cmp::max(1, image_width);
        let image_height = cmp::max(1_u32, (image_width as f32 / aspect_ratio) as u32);
        let focal_length = (look_from - look_at).norm();
        let h = (vfov.to_radians() / 2.0).tan();
        let viewport_height = 2.0 * h * focal_length;
        let viewport_width = viewport_height * (image_width as f32 / image_height as f32);

        let w = (look_from - look_at).normalize();
        let u = Vector3::y().cross(&w).normalize();
        let v = w.cross(&u);

        let viewport_u = viewport_width * u;
        let viewport_v = viewport_height * -v;
        let pixel_du = viewport_u / image_width as f32;
        let pixel_dv = viewport_v / image_height as f32;

        let viewport_upper_left = look_from - focal_length * w - viewport_u / 2.0 - viewport_v / 2.0;
        let pixel00 = viewport_upper_left + 0.5 * (pixel_du + pixel_dv);

        Self {
            image_width,
            image_height,
            center: look_from,
            pixel00,
            pixel_du,
            pixel_dv,
        }
    }

    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    /// Ray through the center of pixel `(x, y)`.
    pub fn get_ray(&self, x: u32, y: u32) -> Ray {
        let pixel_center = self.pixel00 + x as f32 * self.pixel_du + y as f32 * self.pixel_dv;
        Ray::new(self.center, pixel_center - self.center)
    }

    /// Packet covering the 16x16 pixel tile `(tx, ty)`. Ray `i` belongs to
    /// pixel `packet_pixel(tx, ty, i)`; pixels past the image edge are
    /// clamped onto it.
    pub fn get_packet(&self, tx: u32, ty: u32) -> Box<[Ray; PACKET_SIZE]> {
        let mut packet = Box::new([Ray::new(self.center, -Vector3::z()); PACKET_SIZE]);
        for (i, ray) in packet.iter_mut().enumerate() {
            let (x, y) = self.packet_pixel(tx, ty, i);
            *ray = self.get_ray(x, y);
        }
        packet
    }

    pub fn packet_pixel(&self, tx: u32, ty: u32, i: usize) -> (u32, u32) {
        let (tile, ray) = (i as u32 / 16, i as u32 % 16);
        let x = tx * TILE + (tile % 4) * 4 + ray % 4;
        let y = ty * TILE + (tile / 4) * 4 + ray / 4;
        (x.min(self.image_width - 1), y.min(self.image_height - 1))
    }

    /// Traces one primary ray per pixel, rows in parallel.
    pub fn render<H: Hittable + Sync>(&self, scene: &H) -> Frame {
        let rows: Vec<(Vec<f32>, u64)> = (0..self.image_height)
            .into_par_iter()
            .progress_count(self.image_height as u64)
            .map(|y| {
                let mut steps = 0u64;
                let depth = (0..self.image_width)
                    .map(|x| {
                        let mut ray = self.get_ray(x, y);
                        steps += scene.intersect(&mut ray) as u64;
                        ray.hit.t
                    })
                    .collect();
                (depth, steps)
            })
            .collect();
        let mut frame = Frame::new(self.image_width, self.image_height);
        for (y, (depth, steps)) in rows.into_iter().enumerate() {
            let start = y * self.image_width as usize;
            frame.depth[start..start + depth.len()].copy_from_slice(&depth);
            frame.steps += steps;
        }
        frame
    }

    /// Traces the image as 256-ray packets against a binary tree.
    pub fn render_packets(&self, bvh: &Bvh) -> Frame {
        let tiles_x = self.image_width.div_ceil(TILE);
        let tiles_y = self.image_height.div_ceil(TILE);
        let tiles: Vec<(u32, u32, Box<[Ray; PACKET_SIZE]>)> = (0..tiles_x * tiles_y)
            .into_par_iter()
            .progress_count((tiles_x * tiles_y) as u64)
            .map(|t| {
                let (tx, ty) = (t % tiles_x, t / tiles_x);
                let mut packet = self.get_packet(tx, ty);
                bvh.intersect_256(&mut packet);
                (tx, ty, packet)
            })
            .collect();
        let mut frame = Frame::new(self.image_width, self.image_height);
        for (tx, ty, packet) in tiles {
            for (i, ray) in packet.iter().enumerate() {
                let (x, y) = self.packet_pixel(tx, ty, i);
                frame.depth[(y * self.image_width + x) as usize] = ray.hit.t;
            }
        }
        frame
    }
}

/// Per-pixel hit distances of a rendered image plus traversal statistics.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub depth: Vec<f32>,
    pub steps: u64,
}

impl Frame {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: vec![BVH_FAR; (width * height) as usize],
            steps: 0,
        }
    }

    pub fn hit_count(&self) -> usize {
        self.depth.iter().filter(|&&t| t < BVH_FAR).count()
    }

    pub fn mean_steps(&self) -> f32 {
        self.steps as f32 / self.depth.len().max(1) as f32
    }

    /// Fraction of pixels whose depth matches `other` within `eps`.
    pub fn agreement(&self, other: &Frame, eps: f32) -> f32 {
        let same = self
            .depth
            .iter()
            .zip(&other.depth)
            .filter(|(a, b)| (*a - *b).abs() <= eps || (**a >= BVH_FAR && **b >= BVH_FAR))
            .count();
        same as f32 / self.depth.len().max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new(1.0, 32, 60.0, Point3::new(0.0, 0.0, 5.0), Point3::origin())
    }

    #[test]
    fn center_ray_looks_at_target() {
        let cam = Camera::new(1.0, 33, 60.0, Point3::new(0.0, 0.0, 5.0), Point3::origin());
        let ray = cam.get_ray(16, 16);
        assert!((ray.direction - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-5);
        // image x grows to the right, y grows downwards
        assert!(cam.get_ray(0, 16).direction.x < 0.0);
        assert!(cam.get_ray(16, 0).direction.y > 0.0);
    }

    #[test]
    fn packet_covers_tile_once() {
        let cam = camera();
        let mut seen = std::collections::HashSet::new();
        for i in 0..PACKET_SIZE {
            seen.insert(cam.packet_pixel(1, 0, i));
        }
        assert_eq!(seen.len(), PACKET_SIZE);
        assert_eq!(cam.packet_pixel(1, 0, 0), (16, 0));
        assert_eq!(cam.packet_pixel(1, 0, 51), (31, 0));
        assert_eq!(cam.packet_pixel(1, 0, 204), (16, 15));
        assert_eq!(cam.packet_pixel(1, 0, 255), (31, 15));
    }

    #[test]
    fn packets_render_like_single_rays() {
        let cam = camera();
        let quad = [
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 1.0, 0.2),
        ];
        let mut bvh = Bvh::new();
        bvh.build(&quad).unwrap();
        let single = cam.render(&bvh);
        let packets = cam.render_packets(&bvh);
        assert!(single.hit_count() > 0);
        assert!(single.hit_count() < single.depth.len());
        assert_eq!(single.agreement(&packets, 1e-4), 1.0);
        assert!(single.mean_steps() >= 1.0);
    }
}
