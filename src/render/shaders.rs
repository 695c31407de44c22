/// Depth-only pass rendered from the light. No fragment stage.
pub const SHADOW_SHADER: &str = r#"
struct CameraUniform {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> camera: CameraUniform;

@group(1) @binding(0)
var<uniform> object: ObjectUniform;

@vertex
fn vs_shadow(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return camera.proj * camera.view * object.model * vec4<f32>(position, 1.0);
}
"#;

/// Lit color pass. The shadow test must stay in step with `crate::shadow`.
pub const COLOR_SHADER: &str = r#"
const TAU: f32 = 6.283185307179586;

struct FrameUniform {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    lightView: mat4x4<f32>,
    lightProj: mat4x4<f32>,
    lightPosition: vec3<f32>,
    lightNearPlane: f32,
    ambientLight: vec3<f32>,
    lightFarPlane: f32,
    diffuseLight: vec3<f32>,
    lightWidth: f32,
    filterRadius: f32,
    shadowAlgorithm: u32,
    filterPattern: u32,
    sampleCount: u32,
    depthBias: f32,
    sampleOffsets: array<vec4<f32>, 32>,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> frame: FrameUniform;

@group(0) @binding(1)
var depthBuffer: texture_depth_2d;

@group(0) @binding(2)
var depthSampler: sampler;

@group(1) @binding(0)
var<uniform> object: ObjectUniform;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = object.model * vec4<f32>(input.position, 1.0);
    out.position = frame.proj * frame.view * world;
    out.world = world.xyz;
    out.normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;
    return out;
}

fn sampleOffset(i: u32) -> vec2<f32> {
    let pair = frame.sampleOffsets[i / 2u];
    if (i % 2u) == 0u {
        return pair.xy;
    }
    return pair.zw;
}

fn storedDepth(uv: vec2<f32>) -> f32 {
    return textureSampleLevel(depthBuffer, depthSampler, uv, 0);
}

fn linearizeDepth(depth: f32) -> f32 {
    let n = frame.lightNearPlane;
    let f = frame.lightFarPlane;
    return n * f / (f - depth * (f - n));
}

fn isLit(stored: f32, depth: f32) -> bool {
    return stored >= depth - frame.depthBias;
}

fn tapRotation(screen: vec2<f32>) -> mat2x2<f32> {
    if frame.filterPattern != 2u {
        return mat2x2<f32>(1.0, 0.0, 0.0, 1.0);
    }
    let angle = fract(sin(dot(screen, vec2<f32>(12.9898, 78.233))) * 43758.547) * TAU;
    let c = cos(angle);
    let s = sin(angle);
    return mat2x2<f32>(c, s, -s, c);
}

fn hardShadow(uv: vec2<f32>, depth: f32) -> f32 {
    return select(0.0, 1.0, isLit(storedDepth(uv), depth));
}

fn pcf(uv: vec2<f32>, depth: f32, rotation: mat2x2<f32>, radius: f32) -> f32 {
    var lit = 0.0;
    for (var i = 0u; i < frame.sampleCount; i += 1u) {
        let tap = uv + rotation * sampleOffset(i) * radius;
        if isLit(storedDepth(tap), depth) {
            lit += 1.0;
        }
    }
    return lit / f32(max(frame.sampleCount, 1u));
}

fn pcss(uv: vec2<f32>, depth: f32, rotation: mat2x2<f32>) -> f32 {
    let receiver = linearizeDepth(depth);
    let searchRadius = frame.lightWidth * max(receiver - frame.lightNearPlane, 0.0)
        / max(receiver, 1.1920929e-7);

    var sum = 0.0;
    var found = 0u;
    for (var i = 0u; i < frame.sampleCount; i += 1u) {
        let stored = storedDepth(uv + rotation * sampleOffset(i) * searchRadius);
        if !isLit(stored, depth) {
            sum += linearizeDepth(stored);
            found += 1u;
        }
    }
    if found == 0u {
        return 1.0;
    }

    let blocker = sum / f32(found);
    var penumbra = 0.0;
    if blocker > 0.0 {
        penumbra = max(frame.lightWidth * (receiver - blocker) / blocker, 0.0);
    }
    return pcf(uv, depth, rotation, penumbra);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let lightClip = frame.lightProj * frame.lightView * vec4<f32>(input.world, 1.0);
    let ndc = lightClip.xyz / lightClip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    let depth = min(ndc.z, 1.0);
    let rotation = tapRotation(input.position.xy);

    var shadow = 1.0;
    switch frame.shadowAlgorithm {
        case 0u: {
            shadow = hardShadow(uv, depth);
        }
        case 1u: {
            shadow = pcf(uv, depth, rotation, frame.filterRadius);
        }
        case 2u: {
            shadow = pcss(uv, depth, rotation);
        }
        default: {
            shadow = 1.0;
        }
    }

    let normal = normalize(input.normal);
    let toLight = normalize(frame.lightPosition - input.world);
    let nDotL = max(dot(normal, toLight), 0.0);
    let color = object.color.rgb * (frame.ambientLight + frame.diffuseLight * nDotL * shadow);
    return vec4<f32>(color, object.color.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::uniforms::{CameraUniform, FrameUniform, ObjectUniform};
    use wgpu::naga;
    use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

    fn validated(source: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(source)
            .unwrap_or_else(|err| panic!("{}", err.emit_to_string(source)));
        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .unwrap_or_else(|err| panic!("{err:?}"));
        module
    }

    /// Byte size of the uniform bound as `name`.
    fn uniform_size(module: &naga::Module, name: &str) -> usize {
        let global = module
            .global_variables
            .iter()
            .map(|(_, global)| global)
            .find(|global| global.name.as_deref() == Some(name))
            .unwrap_or_else(|| panic!("no global {name}"));
        module.types[global.ty].inner.size(module.to_ctx()) as usize
    }

    fn entry_points(module: &naga::Module) -> Vec<&str> {
        module
            .entry_points
            .iter()
            .map(|entry| entry.name.as_str())
            .collect()
    }

    #[test]
    fn shaders_validate() {
        let shadow = validated(SHADOW_SHADER);
        assert_eq!(entry_points(&shadow), ["vs_shadow"]);
        let color = validated(COLOR_SHADER);
        assert_eq!(entry_points(&color), ["vs_main", "fs_main"]);
    }

    #[test]
    fn uniform_structs_match_host_layouts() {
        let shadow = validated(SHADOW_SHADER);
        assert_eq!(uniform_size(&shadow, "camera"), std::mem::size_of::<CameraUniform>());
        assert_eq!(uniform_size(&shadow, "object"), std::mem::size_of::<ObjectUniform>());
        let color = validated(COLOR_SHADER);
        assert_eq!(uniform_size(&color, "frame"), std::mem::size_of::<FrameUniform>());
        assert_eq!(uniform_size(&color, "object"), std::mem::size_of::<ObjectUniform>());
    }

    #[test]
    fn entry_points_are_present() {
        assert!(SHADOW_SHADER.contains("fn vs_shadow("));
        assert!(!SHADOW_SHADER.contains("@fragment"));
        assert!(COLOR_SHADER.contains("fn vs_main("));
        assert!(COLOR_SHADER.contains("fn fs_main("));
    }

    #[test]
    fn color_shader_declares_frame_uniforms() {
        for name in [
            "lightView",
            "lightProj",
            "lightPosition",
            "lightNearPlane",
            "lightFarPlane",
            "ambientLight",
            "diffuseLight",
            "lightWidth",
            "filterRadius",
            "shadowAlgorithm",
            "filterPattern",
            "sampleCount",
            "depthBias",
            "sampleOffsets",
            "depthBuffer",
            "depthSampler",
        ] {
            assert!(COLOR_SHADER.contains(name), "missing {name}");
        }
    }
}
