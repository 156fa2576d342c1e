//! Compute kernels executed by the CPU backend, one call per global invocation.

use glam::Vec4;

/// Integration step of the N-body kernel.
pub const NBODY_DELTA: f32 = 0.000025;
/// Softening length of the N-body force.
pub const NBODY_SOFTENING: f32 = 0.2;

/// View of the buffers one kernel invocation may touch.
///
/// Reads past the end of `input` yield zeroes, like robust buffer access on a
/// GPU. `output` includes its guard zone, so tail writes land there.
pub struct Invocation<'a> {
    pub(crate) global_id: u32,
    pub(crate) item_count: u32,
    pub(crate) stride: usize,
    pub(crate) input: &'a [u8],
    pub(crate) output: &'a mut [u8],
    pub(crate) aux: &'a mut [u8],
}

impl Invocation<'_> {
    pub fn global_id(&self) -> u32 {
        self.global_id
    }

    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    /// Whether this invocation maps to a real item.
    pub fn in_bounds(&self) -> bool {
        self.global_id < self.item_count
    }

    pub fn read_input<T: bytemuck::Pod>(&self, index: u32) -> T {
        let start = index as usize * self.stride;
        self.input
            .get(start..start + std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .unwrap_or_else(T::zeroed)
    }

    pub fn write_output<T: bytemuck::Pod>(&mut self, index: u32, value: T) {
        let start = index as usize * self.stride;
        self.output[start..start + std::mem::size_of::<T>()]
            .copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Read item `index` of the auxiliary buffer, indexed in units of `T`.
    pub fn read_aux<T: bytemuck::Pod>(&self, index: u32) -> T {
        let size = std::mem::size_of::<T>();
        let start = index as usize * size;
        bytemuck::pod_read_unaligned(&self.aux[start..start + size])
    }

    pub fn write_aux<T: bytemuck::Pod>(&mut self, index: u32, value: T) {
        let size = std::mem::size_of::<T>();
        let start = index as usize * size;
        self.aux[start..start + size].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Copy the raw bytes of item `index` from input to output.
    pub fn copy_item(&mut self, index: u32) {
        let start = index as usize * self.stride;
        let end = start + self.stride;
        match self.input.get(start..end) {
            Some(src) => self.output[start..end].copy_from_slice(src),
            None => self.output[start..end].fill(0),
        }
    }
}

/// A compute kernel. Any `Fn(&mut Invocation)` is one.
pub trait Kernel {
    fn invoke(&self, invocation: &mut Invocation<'_>);
}

impl<F> Kernel for F
where
    F: Fn(&mut Invocation<'_>),
{
    fn invoke(&self, invocation: &mut Invocation<'_>) {
        self(invocation)
    }
}

/// Copies each item from input to output, skipping the partial-group tail.
pub fn identity(inv: &mut Invocation<'_>) {
    if !inv.in_bounds() {
        return;
    }
    inv.copy_item(inv.global_id());
}

/// [`identity`] without the tail check: the last group writes past the slot.
pub fn identity_unchecked(inv: &mut Invocation<'_>) {
    inv.copy_item(inv.global_id());
}

/// One N-body step over `vec4` positions (`w` is mass). The auxiliary buffer
/// holds one `vec4` velocity per body and is updated in place.
pub fn nbody(inv: &mut Invocation<'_>) {
    if !inv.in_bounds() {
        return;
    }
    let idx = inv.global_id();
    let pos = Vec4::from_array(inv.read_input::<[f32; 4]>(idx));

    let mut force = Vec4::ZERO;
    for j in 0..inv.item_count() {
        let other = Vec4::from_array(inv.read_input::<[f32; 4]>(j));
        force += body_force(pos, other);
    }

    let velocity = Vec4::from_array(inv.read_aux::<[f32; 4]>(idx)) + force * NBODY_DELTA;
    inv.write_aux(idx, velocity.to_array());

    let moved = (pos + velocity * NBODY_DELTA).truncate().extend(pos.w);
    inv.write_output(idx, moved.to_array());
}

/// Softened gravitational pull of `other` on a body at `pos`.
fn body_force(pos: Vec4, other: Vec4) -> Vec4 {
    let d = (other - pos).truncate();
    let dist_sq = d.length_squared() + NBODY_SOFTENING * NBODY_SOFTENING;
    let inv_dist = dist_sq.sqrt().recip();
    let coeff = other.w * inv_dist * inv_dist * inv_dist;
    (d * coeff).extend(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation<'a>(
        global_id: u32,
        item_count: u32,
        stride: usize,
        input: &'a [u8],
        output: &'a mut [u8],
        aux: &'a mut [u8],
    ) -> Invocation<'a> {
        Invocation {
            global_id,
            item_count,
            stride,
            input,
            output,
            aux,
        }
    }

    #[test]
    fn closures_are_kernels() {
        let doubled = |inv: &mut Invocation<'_>| {
            let v: u32 = inv.read_input(inv.global_id());
            inv.write_output(inv.global_id(), v * 2);
        };
        let input = 21u32.to_ne_bytes();
        let mut output = [0u8; 4];
        let mut aux: [u8; 0] = [];
        let mut inv = invocation(0, 1, 4, &input, &mut output, &mut aux);
        doubled.invoke(&mut inv);
        assert_eq!(u32::from_ne_bytes(output), 42);
    }

    #[test]
    fn identity_skips_tail() {
        let input = [7u8; 8];
        let mut output = [0u8; 8];
        let mut aux: [u8; 0] = [];
        let mut inv = invocation(1, 1, 4, &input, &mut output, &mut aux);
        identity(&mut inv);
        assert_eq!(output, [0; 8]);
    }

    #[test]
    fn body_force_points_toward_other() {
        let f = body_force(Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert!(f.x > 0.0);
        assert_eq!(f.y, 0.0);
        assert_eq!(f.w, 0.0);
    }

    #[test]
    fn self_force_is_zero() {
        let p = Vec4::new(0.3, -0.2, 0.1, 1.0);
        assert_eq!(body_force(p, p), Vec4::ZERO);
    }

    #[test]
    fn two_bodies_attract() {
        let bodies: Vec<[f32; 4]> = vec![[-0.5, 0.0, 0.0, 1.0], [0.5, 0.0, 0.0, 1.0]];
        let input: Vec<u8> = bytemuck::cast_slice(&bodies).to_vec();
        let mut output = vec![0u8; input.len()];
        let mut aux = vec![0u8; input.len()];
        for id in 0..2 {
            let mut inv = invocation(id, 2, 16, &input, &mut output, &mut aux);
            nbody(&mut inv);
        }
        let first_vel: [f32; 4] = bytemuck::pod_read_unaligned(&aux[..16]);
        let second_vel: [f32; 4] = bytemuck::pod_read_unaligned(&aux[16..]);
        assert!(first_vel[0] > 0.0);
        assert!(second_vel[0] < 0.0);
        let first: [f32; 4] = bytemuck::pod_read_unaligned(&output[..16]);
        assert_eq!(first[3], 1.0);
    }
}
