use pingpong_common::WorkgroupSize;

/// Placeholder replaced with the workgroup size when a compute module is built.
const WORKGROUP_PLACEHOLDER: &str = "{{WORKGROUP_SIZE}}";

/// Substitute the workgroup size into a compute shader template.
pub(crate) fn with_workgroup(template: &str, workgroup: WorkgroupSize) -> String {
    template.replace(WORKGROUP_PLACEHOLDER, &workgroup.get().to_string())
}

/// N-body integration step. Binding 0 is the input slot, 1 the output slot,
/// 2 the velocities shared by both parities.
pub const NBODY_COMPUTE: &str = r#"
@group(0) @binding(0)
var<storage, read> positions_in: array<vec4<f32>>;
@group(0) @binding(1)
var<storage, read_write> positions_out: array<vec4<f32>>;
@group(0) @binding(2)
var<storage, read_write> velocities: array<vec4<f32>>;

const DELTA: f32 = 0.000025;
const SOFTENING: f32 = 0.2;

fn body_force(pos: vec4<f32>, other: vec4<f32>) -> vec4<f32> {
    let d = other.xyz - pos.xyz;
    let dist_sq = dot(d, d) + SOFTENING * SOFTENING;
    let inv_dist = inverseSqrt(dist_sq);
    let coeff = other.w * inv_dist * inv_dist * inv_dist;
    return vec4<f32>(d * coeff, 0.0);
}

@compute @workgroup_size({{WORKGROUP_SIZE}})
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let idx = gid.x;
    let count = arrayLength(&positions_in);
    if (idx >= count) {
        return;
    }

    let pos = positions_in[idx];
    var force = vec4<f32>(0.0);
    for (var i = 0u; i < count; i = i + 1u) {
        force = force + body_force(pos, positions_in[i]);
    }

    let velocity = velocities[idx] + force * DELTA;
    velocities[idx] = velocity;
    positions_out[idx] = vec4<f32>(pos.xyz + velocity.xyz * DELTA, pos.w);
}
"#;

/// Instanced billboards, one per body, blended additively.
pub const NBODY_RENDER: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) corner: vec2<f32>,
};

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @location(0) position: vec4<f32>,
) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
    );
    let corner = corners[vertex_index];
    let size = uniforms.params.x;

    var out: VertexOutput;
    let center = uniforms.view_proj * vec4<f32>(position.xyz, 1.0);
    out.clip_position = center + vec4<f32>(corner * size, 0.0, 0.0);
    out.corner = corner;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let d = length(in.corner);
    if (d > 1.0) {
        discard;
    }
    let intensity = (1.0 - d) * 0.25;
    return vec4<f32>(vec3<f32>(1.0, 0.6, 0.3) * intensity, 1.0);
}
"#;

/// 3x3 convolution over packed RGBA8 pixels. `{{KERNEL}}`, `{{DENOM}}`,
/// `{{OFFSET}}` and `{{GRAYSCALE}}` are filled in per filter.
pub const IMAGE_FILTER_COMPUTE: &str = r#"
struct Params {
    width: u32,
    height: u32,
    _pad0: u32,
    _pad1: u32,
};

@group(0) @binding(0)
var<storage, read> pixels_in: array<u32>;
@group(0) @binding(1)
var<storage, read_write> pixels_out: array<u32>;
@group(0) @binding(2)
var<uniform> params: Params;

const DENOM: f32 = {{DENOM}};
const OFFSET: f32 = {{OFFSET}};
const GRAYSCALE: bool = {{GRAYSCALE}};

fn fetch(x: i32, y: i32) -> vec4<f32> {
    let cx = clamp(x, 0, i32(params.width) - 1);
    let cy = clamp(y, 0, i32(params.height) - 1);
    return unpack4x8unorm(pixels_in[u32(cy) * params.width + u32(cx)]);
}

@compute @workgroup_size({{WORKGROUP_SIZE}})
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let idx = gid.x;
    let count = params.width * params.height;
    if (idx >= count) {
        return;
    }
    let x = i32(idx % params.width);
    let y = i32(idx / params.width);

    var kernel = array<f32, 9>({{KERNEL}});
    var acc = vec3<f32>(0.0);
    var k = 0u;
    for (var dy = -1; dy <= 1; dy = dy + 1) {
        for (var dx = -1; dx <= 1; dx = dx + 1) {
            acc = acc + fetch(x + dx, y + dy).rgb * kernel[k];
            k = k + 1u;
        }
    }

    var rgb: vec3<f32>;
    if (GRAYSCALE) {
        let avg = (acc.r + acc.g + acc.b) / 3.0;
        rgb = vec3<f32>(clamp(avg / DENOM + OFFSET, 0.0, 1.0));
    } else {
        rgb = clamp(acc / DENOM + vec3<f32>(OFFSET), vec3<f32>(0.0), vec3<f32>(1.0));
    }
    pixels_out[idx] = pack4x8unorm(vec4<f32>(rgb, 1.0));
}
"#;

/// Split screen: the source image on the left, the current slot on the right.
pub const IMAGE_RENDER: &str = r#"
struct Params {
    width: u32,
    height: u32,
    _pad0: u32,
    _pad1: u32,
};

@group(0) @binding(0)
var<storage, read> source: array<u32>;
@group(0) @binding(1)
var<storage, read> current: array<u32>;
@group(0) @binding(2)
var<uniform> params: Params;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((vertex_index << 1u) & 2u), f32(vertex_index & 2u));
    var out: VertexOutput;
    out.clip_position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = uv;
    return out;
}

fn pixel_index(u: f32, v: f32) -> u32 {
    let x = min(u32(u * f32(params.width)), params.width - 1u);
    let y = min(u32(v * f32(params.height)), params.height - 1u);
    return y * params.width + x;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    if (in.uv.x < 0.5) {
        return unpack4x8unorm(source[pixel_index(in.uv.x * 2.0, in.uv.y)]);
    }
    return unpack4x8unorm(current[pixel_index((in.uv.x - 0.5) * 2.0, in.uv.y)]);
}
"#;

/// Bounds-checked copy of `u32` items from input to output.
pub const IDENTITY_COMPUTE: &str = r#"
@group(0) @binding(0)
var<storage, read> items_in: array<u32>;
@group(0) @binding(1)
var<storage, read_write> items_out: array<u32>;

@compute @workgroup_size({{WORKGROUP_SIZE}})
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let idx = gid.x;
    if (idx >= arrayLength(&items_in)) {
        return;
    }
    items_out[idx] = items_in[idx];
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_is_substituted() {
        let src = with_workgroup(NBODY_COMPUTE, WorkgroupSize::new(128).unwrap());
        assert!(src.contains("@workgroup_size(128)"));
        assert!(!src.contains(WORKGROUP_PLACEHOLDER));
    }

    #[test]
    fn every_compute_template_has_the_placeholder() {
        for src in [NBODY_COMPUTE, IMAGE_FILTER_COMPUTE, IDENTITY_COMPUTE] {
            assert!(src.contains(WORKGROUP_PLACEHOLDER));
            assert!(src.contains("fn cs_main"));
        }
    }
}
