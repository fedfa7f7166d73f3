/// Procedural mesh generation for the demo scene.
use glam::Vec3;

/// CPU-side triangle mesh: positions, per-vertex normals, triangle indices.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Rotate the mesh in place around the X axis (radians).
    ///
    /// Used to bake fixed orientations into geometry, e.g. laying the
    /// reticle ring flat or pointing the placement cone along the ray.
    pub fn rotate_x(mut self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        let rot = |v: &mut [f32; 3]| {
            let y = v[1] * cos - v[2] * sin;
            let z = v[1] * sin + v[2] * cos;
            v[1] = y;
            v[2] = z;
        };
        for p in &mut self.positions {
            rot(p);
        }
        for n in &mut self.normals {
            rot(n);
        }
        self
    }
}

/// Expand an indexed position list into a flat-shaded mesh: every face gets
/// its own three vertices sharing the face normal.
fn flat_shaded(positions: &[Vec3], indices: &[u32]) -> MeshData {
    let mut mesh = MeshData {
        positions: Vec::with_capacity(indices.len()),
        normals: Vec::with_capacity(indices.len()),
        indices: Vec::with_capacity(indices.len()),
    };

    for tri in indices.chunks_exact(3) {
        let a = positions[tri[0] as usize];
        let b = positions[tri[1] as usize];
        let c = positions[tri[2] as usize];
        let n = (b - a).cross(c - a).normalize_or_zero();

        for v in [a, b, c] {
            let i = mesh.positions.len() as u32;
            mesh.positions.push(v.to_array());
            mesh.normals.push(n.to_array());
            mesh.indices.push(i);
        }
    }

    mesh
}

#[derive(Clone, Copy, Debug)]
pub struct IcosahedronOptions {
    pub radius: f32,
    /// Subdivision level; each level splits every face into four.
    pub detail: u32,
}

impl Default for IcosahedronOptions {
    fn default() -> Self {
        Self {
            radius: 1.0,
            detail: 0,
        }
    }
}

/// Generate a subdivided icosahedron projected onto a sphere, flat shaded.
pub fn generate_icosahedron(opts: IcosahedronOptions) -> MeshData {
    // Golden-ratio rectangles give the 12 base vertices.
    let t = (1.0 + 5.0_f32.sqrt()) / 2.0;

    let mut positions: Vec<Vec3> = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .iter()
    .map(|v| Vec3::from_array(*v))
    .collect();

    let mut indices: Vec<u32> = vec![
        0, 11, 5, 0, 5, 1, 0, 1, 7, 0, 7, 10, 0, 10, 11, //
        1, 5, 9, 5, 11, 4, 11, 10, 2, 10, 7, 6, 7, 1, 8, //
        3, 9, 4, 3, 4, 2, 3, 2, 6, 3, 6, 8, 3, 8, 9, //
        4, 9, 5, 2, 4, 11, 6, 2, 10, 8, 6, 7, 9, 8, 1,
    ];

    for _ in 0..opts.detail {
        let mut next = Vec::with_capacity(indices.len() * 4);
        for tri in indices.chunks_exact(3) {
            let (ia, ib, ic) = (tri[0], tri[1], tri[2]);
            let ab = midpoint(&mut positions, ia, ib);
            let bc = midpoint(&mut positions, ib, ic);
            let ca = midpoint(&mut positions, ic, ia);

            next.extend_from_slice(&[ia, ab, ca]);
            next.extend_from_slice(&[ib, bc, ab]);
            next.extend_from_slice(&[ic, ca, bc]);
            next.extend_from_slice(&[ab, bc, ca]);
        }
        indices = next;
    }

    for p in &mut positions {
        *p = p.normalize() * opts.radius;
    }

    flat_shaded(&positions, &indices)
}

fn midpoint(positions: &mut Vec<Vec3>, a: u32, b: u32) -> u32 {
    let m = (positions[a as usize] + positions[b as usize]) * 0.5;
    positions.push(m);
    (positions.len() - 1) as u32
}

#[derive(Clone, Copy, Debug)]
pub struct TorusOptions {
    pub radius: f32,
    pub tube: f32,
    pub radial_segments: u32,
    pub tubular_segments: u32,
}

impl Default for TorusOptions {
    fn default() -> Self {
        Self {
            radius: 1.0,
            tube: 0.4,
            radial_segments: 8,
            tubular_segments: 8,
        }
    }
}

/// Generate a torus in the XY plane, flat shaded.
pub fn generate_torus(opts: TorusOptions) -> MeshData {
    let radial = opts.radial_segments.max(3);
    let tubular = opts.tubular_segments.max(3);

    let mut positions = Vec::with_capacity(((radial + 1) * (tubular + 1)) as usize);

    for j in 0..=radial {
        let v = j as f32 / radial as f32 * std::f32::consts::TAU;
        let (sin_v, cos_v) = v.sin_cos();

        for i in 0..=tubular {
            let u = i as f32 / tubular as f32 * std::f32::consts::TAU;
            let (sin_u, cos_u) = u.sin_cos();

            positions.push(Vec3::new(
                (opts.radius + opts.tube * cos_v) * cos_u,
                (opts.radius + opts.tube * cos_v) * sin_u,
                opts.tube * sin_v,
            ));
        }
    }

    let ring = tubular + 1;
    let mut indices = Vec::with_capacity((radial * tubular * 6) as usize);

    for j in 0..radial {
        for i in 0..tubular {
            let a = (j + 1) * ring + i;
            let b = j * ring + i;
            let c = j * ring + i + 1;
            let d = (j + 1) * ring + i + 1;

            indices.extend_from_slice(&[a, b, d]);
            indices.extend_from_slice(&[b, c, d]);
        }
    }

    flat_shaded(&positions, &indices)
}

#[derive(Clone, Copy, Debug)]
pub struct RingOptions {
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub theta_segments: u32,
}

impl Default for RingOptions {
    fn default() -> Self {
        Self {
            inner_radius: 0.5,
            outer_radius: 1.0,
            theta_segments: 32,
        }
    }
}

/// Generate a flat annulus in the XY plane with +Z normals.
///
/// The reticle rotates this by -90 degrees about X so it lies on detected
/// surfaces.
pub fn generate_ring(opts: RingOptions) -> MeshData {
    let segments = opts.theta_segments.max(3);

    let mut mesh = MeshData::default();

    for i in 0..=segments {
        let theta = i as f32 / segments as f32 * std::f32::consts::TAU;
        let (sin, cos) = theta.sin_cos();

        mesh.positions
            .push([opts.inner_radius * cos, opts.inner_radius * sin, 0.0]);
        mesh.positions
            .push([opts.outer_radius * cos, opts.outer_radius * sin, 0.0]);
        mesh.normals.push([0.0, 0.0, 1.0]);
        mesh.normals.push([0.0, 0.0, 1.0]);
    }

    for i in 0..segments {
        let inner = i * 2;
        let outer = inner + 1;
        let next_inner = inner + 2;
        let next_outer = inner + 3;

        mesh.indices.extend_from_slice(&[inner, outer, next_inner]);
        mesh.indices
            .extend_from_slice(&[outer, next_outer, next_inner]);
    }

    mesh
}

#[derive(Clone, Copy, Debug)]
pub struct ConeOptions {
    pub radius: f32,
    pub height: f32,
    pub radial_segments: u32,
}

impl Default for ConeOptions {
    fn default() -> Self {
        Self {
            radius: 1.0,
            height: 1.0,
            radial_segments: 32,
        }
    }
}

/// Generate a capped cone with the apex on +Y, flat shaded.
pub fn generate_cone(opts: ConeOptions) -> MeshData {
    let segments = opts.radial_segments.max(3);
    let half = opts.height / 2.0;

    let apex = Vec3::new(0.0, half, 0.0);
    let center = Vec3::new(0.0, -half, 0.0);

    let mut rim = Vec::with_capacity(segments as usize + 1);
    for i in 0..=segments {
        let theta = i as f32 / segments as f32 * std::f32::consts::TAU;
        let (sin, cos) = theta.sin_cos();
        rim.push(Vec3::new(opts.radius * cos, -half, opts.radius * sin));
    }

    let mut positions = vec![apex, center];
    positions.extend_from_slice(&rim);

    let mut indices = Vec::with_capacity(segments as usize * 6);
    for i in 0..segments {
        let a = 2 + i;
        let b = 2 + i + 1;
        // side (apex winding keeps outward faces CCW)
        indices.extend_from_slice(&[0, a, b]);
        // base cap, facing -Y
        indices.extend_from_slice(&[1, b, a]);
    }

    flat_shaded(&positions, &indices)
}
