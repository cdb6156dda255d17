//! Shader library and GPU pipeline for the camera quad.

mod gpu_context;
mod quad_pipeline;

#[cfg(test)]
pub(crate) use gpu_context::test_context;
pub use gpu_context::GpuContext;
pub use quad_pipeline::QuadPipeline;

use crate::error::SetupError;
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;
use std::path::Path;

/// Built-in quad shaders in WGSL.
///
/// The vertex stage passes the position through and forwards the texture
/// coordinate; the fragment stage samples the camera texture.
pub const QUAD_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec4<f32>, @location(1) tex_coords: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = position;
    out.tex_coords = tex_coords;
    return out;
}

@group(0) @binding(0) var t_texture: texture_2d<f32>;
@group(0) @binding(1) var s_sampler: sampler;

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(t_texture, s_sampler, tex_coords);
}
"#;

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";
/// Entry point naga gives GLSL fragment shaders.
const GLSL_ENTRY: &str = "main";

/// A custom fragment shader and the language it is written in.
#[derive(Debug, Clone)]
pub enum ShaderSource {
    /// GLSL fragment shader source code
    Glsl(String),
    /// WGSL fragment shader source code
    Wgsl(String),
}

impl ShaderSource {
    /// Loads a fragment shader, picking the language from the extension.
    pub fn load(path: &Path) -> Result<Self, SetupError> {
        let code = std::fs::read_to_string(path)
            .map_err(|e| SetupError::ShaderParse(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("wgsl") => Ok(ShaderSource::Wgsl(code)),
            _ => Ok(ShaderSource::Glsl(code)),
        }
    }
}

/// Validated WGSL for both quad stages.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    pub vertex_wgsl: String,
    pub vertex_entry: String,
    pub fragment_wgsl: String,
    pub fragment_entry: String,
}

impl ShaderLibrary {
    /// The built-in passthrough shaders.
    pub fn builtin() -> Result<Self, SetupError> {
        Self::compile(None)
    }

    /// Validates the shaders and checks their entry points. The fragment
    /// stage comes from `fragment` when given, from [`QUAD_SHADER`] otherwise.
    ///
    /// Nothing touches the GPU here, so a broken library is caught before
    /// any device is created.
    pub fn compile(fragment: Option<&ShaderSource>) -> Result<Self, SetupError> {
        let builtin = validate_wgsl(QUAD_SHADER)?;
        require_entry(&builtin, ShaderStage::Vertex, VERTEX_ENTRY)?;

        let (fragment_wgsl, fragment_entry) = match fragment {
            None => {
                require_entry(&builtin, ShaderStage::Fragment, FRAGMENT_ENTRY)?;
                (QUAD_SHADER.to_string(), FRAGMENT_ENTRY)
            }
            Some(ShaderSource::Wgsl(code)) => {
                let module = validate_wgsl(code)?;
                require_entry(&module, ShaderStage::Fragment, FRAGMENT_ENTRY)?;
                check_bindings(&module)?;
                (code.clone(), FRAGMENT_ENTRY)
            }
            Some(ShaderSource::Glsl(code)) => (glsl_to_wgsl(code)?, GLSL_ENTRY),
        };

        Ok(Self {
            vertex_wgsl: QUAD_SHADER.to_string(),
            vertex_entry: VERTEX_ENTRY.to_string(),
            fragment_wgsl,
            fragment_entry: fragment_entry.to_string(),
        })
    }
}

fn validate_wgsl(code: &str) -> Result<naga::Module, SetupError> {
    let module = naga::front::wgsl::parse_str(code)
        .map_err(|e| SetupError::ShaderParse(e.emit_to_string(code)))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| SetupError::ShaderValidation(format!("{:?}", e)))?;
    Ok(module)
}

fn require_entry(module: &naga::Module, stage: ShaderStage, name: &str) -> Result<(), SetupError> {
    if module.entry_points.iter().any(|ep| ep.stage == stage && ep.name == name) {
        return Ok(());
    }
    Err(SetupError::MissingEntryPoint {
        stage: match stage {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            _ => "compute",
        },
        name: name.to_string(),
    })
}

/// Custom fragment shaders only get the camera texture (binding 0) and its
/// sampler (binding 1) in group 0.
fn check_bindings(module: &naga::Module) -> Result<(), SetupError> {
    for (_, var) in module.global_variables.iter() {
        if let Some(binding) = &var.binding {
            if binding.group != 0 || binding.binding > 1 {
                return Err(SetupError::ShaderValidation(format!(
                    "`{}` uses group {} binding {}, only the camera texture (0/0) and sampler (0/1) exist",
                    var.name.as_deref().unwrap_or("?"),
                    binding.group,
                    binding.binding
                )));
            }
        }
    }
    Ok(())
}

/// Converts a GLSL fragment shader to WGSL.
fn glsl_to_wgsl(glsl: &str) -> Result<String, SetupError> {
    let mut frontend = Frontend::default();
    let options = Options::from(ShaderStage::Fragment);
    let module = frontend
        .parse(&options, glsl)
        .map_err(|e| SetupError::ShaderParse(format!("GLSL: {:?}", e)))?;
    require_entry(&module, ShaderStage::Fragment, GLSL_ENTRY)?;
    check_bindings(&module)?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator
        .validate(&module)
        .map_err(|e| SetupError::ShaderValidation(format!("{:?}", e)))?;
    naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
        .map_err(|e| SetupError::ShaderParse(format!("WGSL generation: {:?}", e)))
}
