//! Directory listings served as image-array indices.
use std::fs;
use std::path::Path;

/// Extensions (lowercase) recognised as image frames.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["gif", "jpeg", "jpg", "png", "webp"];

/// Name of the index file a directory listing stands in for.
pub const INDEX_FILE_NAME: &str = "index.json";

pub fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Lists the image files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_image_name(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_extension_case_insensitively() {
        assert!(is_image_name("frame.PNG"));
        assert!(is_image_name("a.Jpeg"));
        assert!(is_image_name("b.webp"));
        assert!(!is_image_name("notes.txt"));
        assert!(!is_image_name("png"));
    }

    #[test]
    fn lists_only_images_in_name_order() {
        let temp = tempfile::tempdir().unwrap();
        for name in ["f1.png", "f0.JPG", "readme.md", "index.json"] {
            fs::write(temp.path().join(name), b"x").unwrap();
        }
        fs::create_dir(temp.path().join("nested.png")).unwrap();

        let names = list_images(temp.path()).unwrap();
        assert_eq!(names, vec!["f0.JPG".to_string(), "f1.png".to_string()]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        assert!(list_images(&temp.path().join("absent")).is_err());
    }
}
