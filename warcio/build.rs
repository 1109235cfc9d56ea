//! Generates case-insensitive string conversions for the enumerations described by
//! `data/*.ini`.
//!
//! Each file names the output file and the enum type in its general section, maps variants to
//! their canonical spelling in `[values]` and may list extra accepted spellings in `[aliases]`.
use std::env;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ini::Ini;
use uncased::UncasedStr;

fn main() {
    let base_path: PathBuf = env::var("OUT_DIR").unwrap().into();
    let ini_dir = "data/";
    println!("cargo:rerun-if-changed={}", ini_dir);

    for entry in std::fs::read_dir(ini_dir).expect("failed to read data dir") {
        let entry = entry.expect("error reading directory entry");
        let ini_path = entry.path();
        // Only try to read *.ini
        if ini_path.extension().map(|ext| ext != "ini").unwrap_or(true) {
            continue;
        }

        let ini = Ini::load_from_file(&ini_path).unwrap();
        generate_conversions(&ini, &base_path).unwrap_or_else(|e| {
            panic!("Failed to generate conversions from {:?}: {}", ini_path, e)
        });
    }
}

fn generate_conversions(ini: &Ini, base_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let out_path = base_path.join(
        ini.general_section()
            .get("file")
            .expect("file property missing from ini general section"),
    );
    let type_name = ini
        .general_section()
        .get("type")
        .expect("type property missing from ini general section");
    let values = ini
        .section(Some("values"))
        .expect("values section missing from ini");

    let mut out = BufWriter::new(File::create(&out_path)?);
    let mut map = phf_codegen::Map::<&UncasedStr>::new();

    writeln!(
        &mut out,
        "impl std::convert::AsRef<str> for {t} {{
    fn as_ref(&self) -> &str {{
        match self {{",
        t = type_name
    )?;
    for (variant, repr) in values.iter() {
        writeln!(&mut out, "            {}::{} => \"{}\",", type_name, variant, repr)?;
        map.entry(UncasedStr::new(repr), &format!("{}::{}", type_name, variant));
    }
    writeln!(&mut out, "        }}\n    }}\n}}\n")?;

    if let Some(aliases) = ini.section(Some("aliases")) {
        for (alias, variant) in aliases.iter() {
            map.entry(UncasedStr::new(alias), &format!("{}::{}", type_name, variant));
        }
    }

    writeln!(
        &mut out,
        "impl<'a> std::convert::TryFrom<&'a str> for {t} {{
    type Error = &'a str;

    fn try_from(s: &'a str) -> Result<Self, Self::Error> {{
        use uncased::UncasedStr;
        static MAP: phf::Map<&'static UncasedStr, {t}> = {m};

        MAP.get(UncasedStr::new(s)).copied().ok_or(s)
    }}
}}",
        t = type_name,
        m = map.build()
    )?;
    Ok(())
}
