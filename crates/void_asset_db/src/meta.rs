//! `.meta` sidecars and GUID resolution.
//!
//! Every asset gets a sidecar next to it holding a stable GUID and the
//! import settings for its type:
//!
//! ```text
//! <meta>
//! 	<guid id="<64 hex chars>" generate_new_id="false"/>
//! 	<settings type="texture" sprite_path="" srgb="true" generate_mipmaps="false" max_size="2048"/>
//! </meta>
//! ```
//!
//! A sidecar that cannot be read, carries a malformed GUID, or sets
//! `generate_new_id` is rewritten with a fresh GUID.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::{AssetError, AssetResult};
use crate::index::{AssetIndex, NodeId};
use crate::path;
use crate::xml::XmlElement;

/// Length of a GUID in hex characters
pub const GUID_LEN: usize = 64;

/// Import settings for textures
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureSettings {
    /// Sprite sheet this texture is a frame of
    pub sprite_path: String,
    pub srgb: bool,
    pub generate_mipmaps: bool,
    pub max_size: u32,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            sprite_path: String::new(),
            srgb: true,
            generate_mipmaps: false,
            max_size: 2048,
        }
    }
}

/// Export settings for meshes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshExportSettings {
    /// Extra folder searched for the mesh's textures
    pub texture_folder: String,
    pub flip_normal: bool,
    pub use_uv2: bool,
}

/// Untyped settings, stored and written back verbatim
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenericSettings {
    pub values: BTreeMap<String, String>,
}

/// Per-type settings stored in a sidecar
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportSettings {
    Texture(TextureSettings),
    Mesh(MeshExportSettings),
    Generic(GenericSettings),
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value {
        Some(v) => v == "true" || v == "1",
        None => default,
    }
}

impl ImportSettings {
    /// Value of the `type` attribute
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Texture(_) => "texture",
            Self::Mesh(_) => "mesh",
            Self::Generic(_) => "generic",
        }
    }

    fn to_element(&self) -> XmlElement {
        let element = XmlElement::new("settings").with_attr("type", self.kind());
        match self {
            Self::Texture(t) => element
                .with_attr("sprite_path", &t.sprite_path)
                .with_attr("srgb", t.srgb)
                .with_attr("generate_mipmaps", t.generate_mipmaps)
                .with_attr("max_size", t.max_size),
            Self::Mesh(m) => element
                .with_attr("texture_folder", &m.texture_folder)
                .with_attr("flip_normal", m.flip_normal)
                .with_attr("use_uv2", m.use_uv2),
            Self::Generic(g) => g
                .values
                .iter()
                .fold(element, |e, (k, v)| e.with_attr(k.as_str(), v)),
        }
    }

    /// Read settings of the same kind as `self` from `element`, falling back
    /// to `self`'s values for missing attributes. A sidecar written for a
    /// different kind yields `self` unchanged.
    fn read_from(self, element: &XmlElement) -> Self {
        if element.attr("type") != Some(self.kind()) {
            return self;
        }

        match self {
            Self::Texture(d) => Self::Texture(TextureSettings {
                sprite_path: element.attr("sprite_path").map(str::to_string).unwrap_or(d.sprite_path),
                srgb: parse_bool(element.attr("srgb"), d.srgb),
                generate_mipmaps: parse_bool(element.attr("generate_mipmaps"), d.generate_mipmaps),
                max_size: element
                    .attr("max_size")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(d.max_size),
            }),
            Self::Mesh(d) => Self::Mesh(MeshExportSettings {
                texture_folder: element
                    .attr("texture_folder")
                    .map(str::to_string)
                    .unwrap_or(d.texture_folder),
                flip_normal: parse_bool(element.attr("flip_normal"), d.flip_normal),
                use_uv2: parse_bool(element.attr("use_uv2"), d.use_uv2),
            }),
            Self::Generic(_) => Self::Generic(GenericSettings {
                values: element
                    .attrs
                    .iter()
                    .filter(|(k, _)| k != "type")
                    .cloned()
                    .collect(),
            }),
        }
    }
}

/// Chooses the settings type for an asset by extension
#[derive(Clone, Debug)]
pub struct SettingsSchema {
    pub texture_extensions: Vec<String>,
    pub mesh_extensions: Vec<String>,
}

impl Default for SettingsSchema {
    fn default() -> Self {
        Self {
            texture_extensions: ["png", "jpg", "jpeg", "bmp", "tga", "dds", "hdr"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mesh_extensions: ["obj", "gltf", "glb", "fbx", "dae", "smesh"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl SettingsSchema {
    pub fn is_texture(&self, ext: &str) -> bool {
        self.texture_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn is_mesh(&self, ext: &str) -> bool {
        self.mesh_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Default settings for a lower-case extension
    pub fn settings_for(&self, ext: &str) -> ImportSettings {
        if self.is_texture(ext) {
            ImportSettings::Texture(TextureSettings::default())
        } else if self.is_mesh(ext) {
            ImportSettings::Mesh(MeshExportSettings::default())
        } else {
            ImportSettings::Generic(GenericSettings::default())
        }
    }
}

/// Contents of a `.meta` sidecar
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetMetadata {
    pub guid: String,
    /// Ask the next resolve to replace `guid`
    pub generate_new_id: bool,
    pub settings: ImportSettings,
}

impl AssetMetadata {
    pub fn new(guid: impl Into<String>, settings: ImportSettings) -> Self {
        Self {
            guid: guid.into(),
            generate_new_id: false,
            settings,
        }
    }

    /// Metadata with default settings for an extension
    pub fn for_extension(guid: impl Into<String>, ext: &str, schema: &SettingsSchema) -> Self {
        Self::new(guid, schema.settings_for(ext))
    }

    /// Load a sidecar. `template` selects the settings type and supplies
    /// defaults for anything the file does not set.
    pub fn load(meta_path: &Path, template: ImportSettings) -> AssetResult<Self> {
        let text = fs::read_to_string(meta_path).map_err(|e| AssetError::io(meta_path, e))?;
        let root = XmlElement::parse(&text).map_err(|e| AssetError::meta(meta_path, e.to_string()))?;

        if root.name != "meta" {
            return Err(AssetError::meta(meta_path, format!("unexpected root <{}>", root.name)));
        }

        let guid = root
            .child("guid")
            .ok_or_else(|| AssetError::meta(meta_path, "missing <guid>"))?;
        let id = guid
            .attr("id")
            .ok_or_else(|| AssetError::meta(meta_path, "missing guid id"))?;

        let settings = match root.child("settings") {
            Some(element) => template.read_from(element),
            None => template,
        };

        Ok(Self {
            guid: id.to_string(),
            generate_new_id: parse_bool(guid.attr("generate_new_id"), false),
            settings,
        })
    }

    /// Write the sidecar, replacing any existing file
    pub fn save(&self, meta_path: &Path) -> AssetResult<()> {
        let mut root = XmlElement::new("meta");
        root.push(
            XmlElement::new("guid")
                .with_attr("id", &self.guid)
                .with_attr("generate_new_id", self.generate_new_id),
        );
        root.push(self.settings.to_element());

        let text = root
            .to_document()
            .map_err(|e| AssetError::meta(meta_path, e.to_string()))?;
        fs::write(meta_path, text).map_err(|e| AssetError::io(meta_path, e))
    }
}

/// Sidecar location for an asset on disk
pub fn meta_file(asset_path: &Path) -> PathBuf {
    let mut name = asset_path.as_os_str().to_owned();
    name.push(path::META_EXT);
    PathBuf::from(name)
}

/// Whether `guid` is 64 hex characters
pub fn is_valid_guid(guid: &str) -> bool {
    guid.len() == GUID_LEN && guid.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Generate a fresh GUID for an asset.
///
/// Mixes the asset identity with the current time and a random UUID, so two
/// calls never collide even for the same asset.
pub fn generate_guid(bundle: &str, short_path: &str, create_time: SystemTime) -> String {
    let created = create_time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(bundle.as_bytes());
    hasher.update([0u8]);
    hasher.update(short_path.as_bytes());
    hasher.update([0u8]);
    hasher.update(created.to_le_bytes());
    hasher.update(now.to_le_bytes());
    hasher.update(uuid::Uuid::new_v4().as_bytes());

    format!("{:x}", hasher.finalize())
}

/// Load the sidecar at `meta_path`, or rewrite it with a GUID from
/// `make_guid` when loading fails, the flag asks for a new id, or
/// `reject` refuses the stored GUID. Returns the GUID and whether it was
/// regenerated.
fn load_or_regenerate(
    meta_path: &Path,
    template: ImportSettings,
    reject: impl Fn(&str) -> bool,
    make_guid: impl FnOnce() -> String,
) -> AssetResult<(String, bool)> {
    let mut meta = match AssetMetadata::load(meta_path, template.clone()) {
        Ok(meta) if !meta.generate_new_id && !reject(&meta.guid) => return Ok((meta.guid, false)),
        Ok(meta) => {
            log::debug!("Regenerating GUID for {:?}", meta_path);
            meta
        }
        Err(e) => {
            log::debug!("Creating sidecar {:?}: {}", meta_path, e);
            AssetMetadata::new(String::new(), template)
        }
    };

    meta.guid = make_guid();
    meta.generate_new_id = false;
    meta.save(meta_path)?;
    Ok((meta.guid, true))
}

/// Resolve the GUID of the asset at `asset_path`, creating or repairing its
/// sidecar as needed.
///
/// Repeated calls against an unchanged sidecar return the same GUID.
pub fn resolve_guid(asset_path: &Path, schema: &SettingsSchema) -> AssetResult<String> {
    let display = path::normalize(&asset_path.to_string_lossy());
    let template = schema.settings_for(&path::extension(&display));
    let created = fs::metadata(asset_path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .unwrap_or_else(|_| SystemTime::now());

    let (guid, _) = load_or_regenerate(
        &meta_file(asset_path),
        template,
        |guid| !is_valid_guid(guid),
        || generate_guid(&path::bundle_name(&display), &display, created),
    )?;
    Ok(guid)
}

/// Resolves GUIDs for indexed nodes and keeps the GUID -> node map.
///
/// A stored GUID already owned by another live node (an asset copied
/// together with its sidecar) is treated as invalid and replaced.
#[derive(Default)]
pub struct GuidResolver {
    schema: SettingsSchema,
    guid_to_node: HashMap<String, NodeId>,
}

impl GuidResolver {
    pub fn new(schema: SettingsSchema) -> Self {
        Self {
            schema,
            guid_to_node: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &SettingsSchema {
        &self.schema
    }

    /// Resolve, record and return the GUID of node `id`
    pub fn resolve(&mut self, index: &mut AssetIndex, id: NodeId) -> AssetResult<String> {
        let node = index
            .get(id)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(format!("{:?}", id)))?;

        let template = self.schema.settings_for(&node.extension());
        let owners = &self.guid_to_node;
        let live_index: &AssetIndex = index;

        let (guid, regenerated) = load_or_regenerate(
            &meta_file(&node.full_path),
            template,
            |guid| {
                !is_valid_guid(guid)
                    || owners
                        .get(guid)
                        .map(|owner| *owner != id && live_index.get(*owner).is_some())
                        .unwrap_or(false)
            },
            || generate_guid(&node.bundle, &node.path, node.create_time),
        )?;

        if regenerated {
            log::debug!("Assigned GUID {} to {}", guid, node.path);
        }

        if let Some(old) = node.guid.as_ref().filter(|old| **old != guid) {
            self.guid_to_node.remove(old);
        }
        self.guid_to_node.insert(guid.clone(), id);

        if let Some(live) = index.get_mut(id) {
            live.guid = Some(guid.clone());
        }
        index.claim_sidecar(&node.full_path);

        Ok(guid)
    }

    /// Node that owns `guid`, if it is still live
    pub fn node_by_guid(&self, guid: &str) -> Option<NodeId> {
        self.guid_to_node.get(guid).copied()
    }

    /// Drop the mapping for a deleted asset
    pub fn forget(&mut self, guid: &str) {
        self.guid_to_node.remove(guid);
    }

    pub fn clear(&mut self) {
        self.guid_to_node.clear();
    }

    pub fn len(&self) -> usize {
        self.guid_to_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guid_to_node.is_empty()
    }
}
