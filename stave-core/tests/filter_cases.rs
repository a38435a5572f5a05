//! Parameterised index filter and extension cases.

use rstest::rstest;
use serde_json::json;

use stave_core::{IndexFilter, SourceExtension};

#[rstest]
#[case(json!(null), true)]
#[case(json!([]), true)]
#[case(json!("A.groovy"), true)]
#[case(json!(12), true)]
#[case(json!({"names": ["A.groovy"]}), true)]
#[case(json!(["A.groovy", null]), true)]
#[case(json!(["A.groovy"]), false)]
#[case(json!(["A.groovy", "B.groovy"]), false)]
fn filter_json_shapes(#[case] value: serde_json::Value, #[case] unrestricted: bool) {
    let filter = IndexFilter::from_json(&value);
    assert_eq!(filter.is_unrestricted(), unrestricted, "value: {value}");
}

#[rstest]
#[case(&[], "A.groovy", true)]
#[case(&[], "C.txt", true)]
#[case(&["A.groovy"], "A.groovy", true)]
#[case(&["A.groovy"], "B.groovy", false)]
#[case(&["A.groovy"], "a.groovy", false)]
fn filter_admits(#[case] names: &[&str], #[case] candidate: &str, #[case] expected: bool) {
    let filter = IndexFilter::from_names(names.iter().copied());
    assert_eq!(filter.admits(candidate), expected);
}

#[rstest]
#[case("groovy", "Main.groovy", true)]
#[case(".groovy", "Main.groovy", true)]
#[case("groovy", "Main.gradle", false)]
#[case("src", "A.src", true)]
#[case("src", "C.txt", false)]
#[case("groovy", ".groovy", true)]
#[case("groovy", "Main.groovyx", false)]
fn extension_matches(#[case] ext: &str, #[case] name: &str, #[case] expected: bool) {
    assert_eq!(SourceExtension::new(ext).matches(name), expected);
}

#[test]
fn filter_yaml_is_a_plain_list() {
    let filter = IndexFilter::from_names(["B.groovy", "A.groovy"]);
    let yaml = serde_yaml::to_string(&filter).expect("serialize");
    assert_eq!(yaml, "- A.groovy\n- B.groovy\n");
}
