//! Orchestrates one descriptor run, from the descriptor fetch to a merged
//! uniform set ready for the render loop.
//!
//! Types:
//!
//! - `PipelineStage` names the strictly sequential states of a run.
//! - `DescriptorPipeline` holds the collaborators (fetcher, include resolver,
//!   capture device) and the target frame size.
//! - `PreparedShader` is what a successful run hands to the renderer.
//!
//! Functions:
//!
//! - `DescriptorPipeline::run` walks the stages. The descriptor fetch, the
//!   shader fetch, and resolving texture entry references are fatal and
//!   surface as `PipelineError`; every other failure degrades in place.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::camera::{acquire_camera, CaptureDevice, CaptureRequest, NoCaptureDevice};
use crate::degrade::Degrade;
use crate::descriptor::{ShaderDescriptor, TextureEntry};
use crate::error::LoadError;
use crate::fetch::Fetcher;
use crate::includes::{IncludeResolver, NoIncludes};
use crate::resolver::ResolverContext;
use crate::textures::{array_uniforms, image_uniforms, Dimensions, TextureAssembler, TextureSource};
use crate::uniforms::{Uniform, UniformLayer, UniformSet, CAMERA_UNIFORM};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    FetchDescriptor,
    ResolveShader,
    ResolveIncludes,
    ResolveTextures,
    AcquireCamera,
    AssembleUniforms,
    StartLoop,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchDescriptor => "fetch-descriptor",
            Self::ResolveShader => "resolve-shader",
            Self::ResolveIncludes => "resolve-includes",
            Self::ResolveTextures => "resolve-textures",
            Self::AcquireCamera => "acquire-camera",
            Self::AssembleUniforms => "assemble-uniforms",
            Self::StartLoop => "start-loop",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("pipeline aborted during {stage}: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub source: LoadError,
}

impl PipelineError {
    fn at(stage: PipelineStage) -> impl FnOnce(LoadError) -> Self {
        move |source| {
            error!(%stage, error = %source, "pipeline aborted");
            Self { stage, source }
        }
    }
}

#[derive(Debug)]
pub struct PreparedShader {
    pub descriptor_url: Url,
    pub descriptor: ShaderDescriptor,
    pub fragment_source: String,
    pub uniforms: UniformSet,
    /// Names of optional features that failed and were substituted.
    pub degraded: Vec<String>,
}

pub struct DescriptorPipeline {
    fetcher: Fetcher,
    assembler: TextureAssembler,
    includes: Arc<dyn IncludeResolver>,
    camera: Arc<dyn CaptureDevice>,
    capture_constraints: BTreeMap<String, serde_json::Value>,
}

impl fmt::Debug for DescriptorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorPipeline")
            .field("dimensions", &self.assembler.dimensions())
            .field("capture_constraints", &self.capture_constraints)
            .finish_non_exhaustive()
    }
}

impl DescriptorPipeline {
    pub fn new(fetcher: Fetcher, dimensions: Dimensions) -> Self {
        Self {
            assembler: TextureAssembler::new(fetcher.clone(), dimensions),
            fetcher,
            includes: Arc::new(NoIncludes),
            camera: Arc::new(NoCaptureDevice),
            capture_constraints: BTreeMap::new(),
        }
    }

    pub fn with_includes(mut self, includes: impl IncludeResolver + 'static) -> Self {
        self.includes = Arc::new(includes);
        self
    }

    pub fn with_camera(mut self, camera: impl CaptureDevice + 'static) -> Self {
        self.camera = Arc::new(camera);
        self
    }

    pub fn with_capture_constraints(
        mut self,
        constraints: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        self.capture_constraints = constraints;
        self
    }

    /// Runs every stage in order. `descriptor_ref` is resolved against
    /// `root`; everything named inside the descriptor resolves against the
    /// descriptor's own location.
    pub async fn run(
        &self,
        root: &ResolverContext,
        descriptor_ref: &str,
        control: UniformLayer,
    ) -> Result<PreparedShader, PipelineError> {
        let mut degraded = Vec::new();

        info!(stage = %PipelineStage::FetchDescriptor, reference = descriptor_ref, "pipeline stage");
        let (descriptor_url, descriptor, context) = self
            .fetch_descriptor(root, descriptor_ref)
            .await
            .map_err(PipelineError::at(PipelineStage::FetchDescriptor))?;
        for issue in descriptor.validate() {
            warn!(uri = %descriptor_url, issue = %issue, "descriptor issue");
        }

        info!(stage = %PipelineStage::ResolveShader, "pipeline stage");
        let shader_source = self
            .resolve_shader(&context, &descriptor)
            .await
            .map_err(PipelineError::at(PipelineStage::ResolveShader))?;

        info!(stage = %PipelineStage::ResolveIncludes, "pipeline stage");
        let expanded = self.includes.expand(&shader_source).await;
        if expanded.is_err() {
            degraded.push("includes".to_string());
        }
        let fragment_source = expanded.or_degrade("includes", shader_source);

        info!(
            stage = %PipelineStage::ResolveTextures,
            entries = descriptor.textures_index.len(),
            "pipeline stage"
        );
        let textures = self
            .resolve_textures(&context, &descriptor.textures_index, &mut degraded)
            .await
            .map_err(PipelineError::at(PipelineStage::ResolveTextures))?;

        let mut camera = UniformLayer::new("camera");
        if descriptor.webcam {
            info!(stage = %PipelineStage::AcquireCamera, "pipeline stage");
            let request = CaptureRequest::new(self.assembler.dimensions())
                .with_constraints(self.capture_constraints.clone());
            let acquired = acquire_camera(self.camera.as_ref(), &request)
                .await
                .map(|texture| Uniform::Texture(Some(TextureSource::Camera(texture))));
            if acquired.is_err() {
                degraded.push("webcam".to_string());
            }
            let value = acquired.or_degrade_with("webcam", Uniform::null_texture);
            camera.insert(CAMERA_UNIFORM, value);
        }

        info!(stage = %PipelineStage::AssembleUniforms, "pipeline stage");
        let uniforms =
            UniformSet::merge([UniformLayer::builtins(), camera, control, textures]);

        info!(
            stage = %PipelineStage::StartLoop,
            uniforms = uniforms.len(),
            degraded = degraded.len(),
            "pipeline ready"
        );
        Ok(PreparedShader {
            descriptor_url,
            descriptor,
            fragment_source,
            uniforms,
            degraded,
        })
    }

    /// Fetches the descriptor and derives the context its references
    /// resolve against.
    async fn fetch_descriptor(
        &self,
        root: &ResolverContext,
        descriptor_ref: &str,
    ) -> Result<(Url, ShaderDescriptor, ResolverContext), LoadError> {
        let url = root.resolve(descriptor_ref)?;
        let descriptor: ShaderDescriptor = self.fetcher.json(&url).await?;
        let context = root.descend(descriptor_ref)?;
        Ok((url, descriptor, context))
    }

    async fn resolve_shader(
        &self,
        context: &ResolverContext,
        descriptor: &ShaderDescriptor,
    ) -> Result<String, LoadError> {
        let url = context.resolve(&descriptor.shader_uri)?;
        self.fetcher.text(&url).await
    }

    /// Every entry reference is resolved before any I/O; a malformed one
    /// aborts the stage. Per-entry load failures become a null uniform.
    async fn resolve_textures(
        &self,
        context: &ResolverContext,
        entries: &[TextureEntry],
        degraded: &mut Vec<String>,
    ) -> Result<UniformLayer, LoadError> {
        let resolved = entries
            .iter()
            .map(|entry| {
                let url = entry.uri().map(|uri| context.resolve(uri)).transpose()?;
                Ok::<_, LoadError>((entry, url))
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        let loads = resolved
            .into_iter()
            .map(|(entry, url)| async move { (entry, self.load_entry(entry, url).await) });

        let mut layer = UniformLayer::new("textures");
        for (entry, outcome) in join_all(loads).await {
            let name = entry.uniform();
            let uniforms = match outcome {
                Ok(uniforms) => uniforms,
                Err(err) => {
                    degraded.push(name.to_string());
                    warn!(uniform = %name, kind = entry.kind(), error = %err, "texture entry degraded to null");
                    vec![(name.to_string(), Uniform::null_texture())]
                }
            };
            layer.extend(uniforms);
        }
        Ok(layer)
    }

    async fn load_entry(
        &self,
        entry: &TextureEntry,
        url: Option<Url>,
    ) -> Result<Vec<(String, Uniform)>, LoadError> {
        let name = entry.uniform();
        match (entry, url) {
            (TextureEntry::Image { .. }, Some(url)) => {
                let texture = self.assembler.load_image(&url).await?;
                Ok(image_uniforms(name, texture))
            }
            (TextureEntry::Array { .. }, Some(url)) => {
                let texture = self.assembler.load_array(&url).await?;
                Ok(array_uniforms(name, texture))
            }
            _ => Ok(vec![(name.to_string(), Uniform::null_texture())]),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::testing::{png_bytes, MemoryTransport};
    use crate::uniforms::{DELTA_UNIFORM, RESOLUTION_UNIFORM, TIME_UNIFORM};

    fn root() -> ResolverContext {
        ResolverContext::parse("https://host/").unwrap()
    }

    fn pipeline(transport: MemoryTransport) -> DescriptorPipeline {
        DescriptorPipeline::new(Fetcher::new(transport), Dimensions::new(4, 4))
    }

    fn keys(set: &UniformSet) -> Vec<&str> {
        set.keys().collect()
    }

    #[tokio::test]
    async fn references_resolve_against_descriptor_location() {
        let transport = MemoryTransport::new()
            .with(
                "https://host/assets/desc.json",
                r#"{"shader_uri":"s.frag","textures_index":[{"type":"image","uri":"a.png","uniform":"u_tex"}]}"#,
            )
            .with("https://host/assets/s.frag", "void main() {}")
            .with("https://host/assets/a.png", png_bytes(2, 2, [1, 2, 3, 255]));
        let requests = transport.requests();

        let prepared = pipeline(transport)
            .run(&root(), "assets/desc.json", UniformLayer::new("control"))
            .await
            .unwrap();

        assert_eq!(prepared.descriptor_url.as_str(), "https://host/assets/desc.json");
        assert_eq!(prepared.fragment_source, "void main() {}");
        assert!(prepared.uniforms.get("u_tex").and_then(Uniform::texture).is_some());
        assert!(prepared.uniforms.contains("u_tex_corr"));
        let requests = requests.lock().unwrap();
        assert!(requests.contains(&"https://host/assets/s.frag".to_string()));
        assert!(requests.contains(&"https://host/assets/a.png".to_string()));
    }

    #[tokio::test]
    async fn array_frames_resolve_against_index_location() {
        let transport = MemoryTransport::new()
            .with(
                "https://host/desc.json",
                r#"{"shader_uri":"s.frag","textures_index":[{"type":"array","uri":"assets/idx.json","uniform":"u_frames"}]}"#,
            )
            .with("https://host/s.frag", "void main() {}")
            .with("https://host/assets/idx.json", r#"["f0.png","f1.png"]"#)
            .with("https://host/assets/f0.png", png_bytes(4, 4, [0, 0, 0, 255]))
            .with("https://host/assets/f1.png", png_bytes(4, 4, [9, 9, 9, 255]));

        let prepared = pipeline(transport)
            .run(&root(), "desc.json", UniformLayer::new("control"))
            .await
            .unwrap();

        assert_eq!(
            prepared.uniforms.get("u_frames_depth").and_then(Uniform::as_int),
            Some(2)
        );
        match prepared.uniforms.get("u_frames").and_then(Uniform::texture) {
            Some(TextureSource::Array(array)) => assert_eq!(array.data.len(), 2 * 4 * 4 * 4),
            other => panic!("expected array texture, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bare_descriptor_yields_builtins_plus_control() {
        let transport = MemoryTransport::new()
            .with("https://host/desc.json", r#"{"shader_uri":"s.frag","textures_index":[]}"#)
            .with("https://host/s.frag", "void main() {}");
        let control = UniformLayer::new("control").with("u_speed", Uniform::Float(0.5));

        let prepared = pipeline(transport).run(&root(), "desc.json", control).await.unwrap();

        assert_eq!(
            keys(&prepared.uniforms),
            vec![DELTA_UNIFORM, RESOLUTION_UNIFORM, "u_speed", TIME_UNIFORM]
        );
        assert!(prepared.degraded.is_empty());
    }

    #[tokio::test]
    async fn missing_shader_aborts_the_run() {
        let transport = MemoryTransport::new()
            .with("https://host/desc.json", r#"{"shader_uri":"s.frag"}"#)
            .with_status("https://host/s.frag", 404);

        let err = pipeline(transport)
            .run(&root(), "desc.json", UniformLayer::new("control"))
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::ResolveShader);
        assert!(matches!(err.source, LoadError::Fetch(ref fetch) if fetch.status() == Some(404)));
    }

    #[tokio::test]
    async fn missing_descriptor_aborts_at_first_stage() {
        let err = pipeline(MemoryTransport::new())
            .run(&root(), "desc.json", UniformLayer::new("control"))
            .await
            .unwrap_err();
        assert_eq!(err.stage, PipelineStage::FetchDescriptor);
    }

    #[tokio::test]
    async fn one_missing_image_degrades_to_null() {
        let transport = MemoryTransport::new()
            .with(
                "https://host/desc.json",
                r#"{"shader_uri":"s.frag","textures_index":[
                    {"type":"image","uri":"a.png","uniform":"u_a"},
                    {"type":"image","uri":"b.png","uniform":"u_b"},
                    {"type":"image","uri":"c.png","uniform":"u_c"}
                ]}"#,
            )
            .with("https://host/s.frag", "void main() {}")
            .with("https://host/a.png", png_bytes(2, 2, [1, 1, 1, 255]))
            .with("https://host/c.png", png_bytes(2, 2, [3, 3, 3, 255]));

        let prepared = pipeline(transport)
            .run(&root(), "desc.json", UniformLayer::new("control"))
            .await
            .unwrap();

        let set = &prepared.uniforms;
        let resolved = ["u_a", "u_b", "u_c"]
            .iter()
            .filter(|name| set.get(name).and_then(Uniform::texture).is_some())
            .count();
        assert_eq!(resolved, 2);
        assert!(set.get("u_b").is_some_and(Uniform::is_null));
        assert!(!set.contains("u_b_corr"));
        assert_eq!(prepared.degraded, vec!["u_b".to_string()]);
    }

    #[tokio::test]
    async fn failing_array_degrades_without_depth() {
        let transport = MemoryTransport::new()
            .with(
                "https://host/desc.json",
                r#"{"shader_uri":"s.frag","textures_index":[
                    {"type":"array","uri":"frames/idx.json","uniform":"u_frames"},
                    {"type":"array","uri":"gone/idx.json","uniform":"u_gone"}
                ]}"#,
            )
            .with("https://host/s.frag", "void main() {}")
            .with("https://host/frames/idx.json", r#"["f0.png","missing.png"]"#)
            .with("https://host/frames/f0.png", png_bytes(4, 4, [5, 5, 5, 255]));

        let prepared = pipeline(transport)
            .run(&root(), "desc.json", UniformLayer::new("control"))
            .await
            .unwrap();

        let set = &prepared.uniforms;
        for name in ["u_frames", "u_gone"] {
            assert!(set.get(name).is_some_and(Uniform::is_null), "{name} should be null");
            assert!(!set.contains(&format!("{name}_depth")));
        }
        assert_eq!(
            prepared.degraded,
            vec!["u_frames".to_string(), "u_gone".to_string()]
        );
    }

    #[tokio::test]
    async fn placeholder_reserves_a_null_slot() {
        let transport = MemoryTransport::new()
            .with(
                "https://host/desc.json",
                r#"{"shader_uri":"s.frag","textures_index":[{"type":"placeholder","uniform":"u_later"}]}"#,
            )
            .with("https://host/s.frag", "void main() {}");
        let requests = transport.requests();

        let prepared = pipeline(transport)
            .run(&root(), "desc.json", UniformLayer::new("control"))
            .await
            .unwrap();

        assert!(prepared.uniforms.get("u_later").is_some_and(Uniform::is_null));
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_entry_reference_aborts_texture_stage() {
        let transport = MemoryTransport::new()
            .with(
                "https://host/desc.json",
                r#"{"shader_uri":"s.frag","textures_index":[{"type":"image","uri":"http://[::1","uniform":"u_a"}]}"#,
            )
            .with("https://host/s.frag", "void main() {}");

        let err = pipeline(transport)
            .run(&root(), "desc.json", UniformLayer::new("control"))
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::ResolveTextures);
        assert!(matches!(err.source, LoadError::Resolution(_)));
    }

    #[tokio::test]
    async fn unavailable_camera_yields_null_u_cam() {
        let transport = MemoryTransport::new()
            .with("https://host/desc.json", r#"{"shader_uri":"s.frag","webcam":true}"#)
            .with("https://host/s.frag", "void main() {}");

        let prepared = pipeline(transport)
            .run(&root(), "desc.json", UniformLayer::new("control"))
            .await
            .unwrap();

        assert!(prepared.uniforms.get(CAMERA_UNIFORM).is_some_and(Uniform::is_null));
        assert_eq!(prepared.degraded, vec!["webcam".to_string()]);
    }

    struct FailingIncludes;

    #[async_trait]
    impl IncludeResolver for FailingIncludes {
        async fn expand(&self, _source: &str) -> Result<String, LoadError> {
            let url = Url::parse("https://lygia.xyz/x.glsl").unwrap();
            Err(crate::error::DecodeError::new(&url, "service down").into())
        }
    }

    #[tokio::test]
    async fn include_failure_keeps_raw_source() {
        let transport = MemoryTransport::new()
            .with("https://host/desc.json", r#"{"shader_uri":"s.frag"}"#)
            .with("https://host/s.frag", "#include \"lygia/x.glsl\"\nvoid main() {}");

        let prepared = pipeline(transport)
            .with_includes(FailingIncludes)
            .run(&root(), "desc.json", UniformLayer::new("control"))
            .await
            .unwrap();

        assert_eq!(prepared.fragment_source, "#include \"lygia/x.glsl\"\nvoid main() {}");
        assert_eq!(prepared.degraded, vec!["includes".to_string()]);
    }

    #[tokio::test]
    async fn textures_override_control_uniforms() {
        let transport = MemoryTransport::new()
            .with(
                "https://host/desc.json",
                r#"{"shader_uri":"s.frag","textures_index":[{"type":"placeholder","uniform":"u_tex"}]}"#,
            )
            .with("https://host/s.frag", "void main() {}");
        let control = UniformLayer::new("control").with("u_tex", Uniform::Float(1.0));

        let prepared = pipeline(transport).run(&root(), "desc.json", control).await.unwrap();
        assert!(prepared.uniforms.get("u_tex").is_some_and(Uniform::is_null));
    }
}
