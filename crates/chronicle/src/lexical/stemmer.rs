//! Porter stemmer (steps 1 through 5)
//!
//! Operates on lowercase ASCII words. Words containing anything else, and
//! words of two characters or fewer, are returned unchanged.

/// Reduce `word` to its Porter stem.
pub fn stem(word: &str) -> String {
    if word.len() <= 2 || !word.bytes().all(|b| b.is_ascii_lowercase()) {
        return word.to_string();
    }

    let mut w = word.as_bytes().to_vec();
    step1a(&mut w);
    step1b(&mut w);
    step1c(&mut w);
    step2(&mut w);
    step3(&mut w);
    step4(&mut w);
    step5a(&mut w);
    step5b(&mut w);

    // only ASCII bytes were ever written
    String::from_utf8(w).unwrap_or_else(|_| word.to_string())
}

fn is_consonant(b: &[u8], i: usize) -> bool {
    match b[i] {
        b'a' | b'e' | b'i' | b'o' | b'u' => false,
        b'y' => i == 0 || !is_consonant(b, i - 1),
        _ => true,
    }
}

/// Number of vowel-consonant sequences in `b[..len]`.
fn measure(b: &[u8], len: usize) -> usize {
    let mut n = 0;
    let mut i = 0;
    while i < len && is_consonant(b, i) {
        i += 1;
    }
    loop {
        while i < len && !is_consonant(b, i) {
            i += 1;
        }
        if i >= len {
            return n;
        }
        while i < len && is_consonant(b, i) {
            i += 1;
        }
        n += 1;
        if i >= len {
            return n;
        }
    }
}

fn has_vowel(b: &[u8], len: usize) -> bool {
    (0..len).any(|i| !is_consonant(b, i))
}

fn ends_double_consonant(b: &[u8], len: usize) -> bool {
    len >= 2 && b[len - 1] == b[len - 2] && is_consonant(b, len - 1)
}

/// consonant-vowel-consonant ending, last consonant not w, x or y
fn ends_cvc(b: &[u8], len: usize) -> bool {
    len >= 3
        && is_consonant(b, len - 1)
        && !is_consonant(b, len - 2)
        && is_consonant(b, len - 3)
        && !matches!(b[len - 1], b'w' | b'x' | b'y')
}

fn ends_with(w: &[u8], suffix: &str) -> bool {
    w.ends_with(suffix.as_bytes())
}

fn replace_suffix(w: &mut Vec<u8>, suffix_len: usize, replacement: &str) {
    w.truncate(w.len() - suffix_len);
    w.extend_from_slice(replacement.as_bytes());
}

/// Apply the first matching rule when the remaining stem has measure above `min_measure`.
fn apply_rules(w: &mut Vec<u8>, rules: &[(&str, &str)], min_measure: usize) {
    for (suffix, replacement) in rules {
        if ends_with(w, suffix) {
            let stem_len = w.len() - suffix.len();
            if measure(w, stem_len) > min_measure {
                replace_suffix(w, suffix.len(), replacement);
            }
            return;
        }
    }
}

fn step1a(w: &mut Vec<u8>) {
    if ends_with(w, "sses") {
        replace_suffix(w, 4, "ss");
    } else if ends_with(w, "ies") {
        replace_suffix(w, 3, "i");
    } else if ends_with(w, "ss") {
    } else if ends_with(w, "s") {
        w.pop();
    }
}

fn step1b(w: &mut Vec<u8>) {
    if ends_with(w, "eed") {
        if measure(w, w.len() - 3) > 0 {
            w.pop();
        }
        return;
    }

    let suffix_len = if ends_with(w, "ed") {
        2
    } else if ends_with(w, "ing") {
        3
    } else {
        return;
    };
    if !has_vowel(w, w.len() - suffix_len) {
        return;
    }
    w.truncate(w.len() - suffix_len);

    if ends_with(w, "at") || ends_with(w, "bl") || ends_with(w, "iz") {
        w.push(b'e');
    } else if ends_double_consonant(w, w.len()) && !matches!(w[w.len() - 1], b'l' | b's' | b'z') {
        w.pop();
    } else if measure(w, w.len()) == 1 && ends_cvc(w, w.len()) {
        w.push(b'e');
    }
}

fn step1c(w: &mut [u8]) {
    let len = w.len();
    if w[len - 1] == b'y' && has_vowel(w, len - 1) {
        w[len - 1] = b'i';
    }
}

fn step2(w: &mut Vec<u8>) {
    const RULES: &[(&str, &str)] = &[
        ("ational", "ate"),
        ("tional", "tion"),
        ("enci", "ence"),
        ("anci", "ance"),
        ("izer", "ize"),
        ("bli", "ble"),
        ("alli", "al"),
        ("entli", "ent"),
        ("eli", "e"),
        ("ousli", "ous"),
        ("ization", "ize"),
        ("ation", "ate"),
        ("ator", "ate"),
        ("alism", "al"),
        ("iveness", "ive"),
        ("fulness", "ful"),
        ("ousness", "ous"),
        ("aliti", "al"),
        ("iviti", "ive"),
        ("biliti", "ble"),
        ("logi", "log"),
    ];
    apply_rules(w, RULES, 0);
}

fn step3(w: &mut Vec<u8>) {
    const RULES: &[(&str, &str)] = &[
        ("icate", "ic"),
        ("ative", ""),
        ("alize", "al"),
        ("iciti", "ic"),
        ("ical", "ic"),
        ("ful", ""),
        ("ness", ""),
    ];
    apply_rules(w, RULES, 0);
}

fn step4(w: &mut Vec<u8>) {
    const SUFFIXES: &[&str] = &[
        "al", "ance", "ence", "er", "ic", "able", "ible", "ant", "ement", "ment", "ent", "ion",
        "ou", "ism", "ate", "iti", "ous", "ive", "ize",
    ];
    for suffix in SUFFIXES {
        if ends_with(w, suffix) {
            let stem_len = w.len() - suffix.len();
            let allowed = *suffix != "ion"
                || (stem_len > 0 && matches!(w[stem_len - 1], b's' | b't'));
            if allowed && measure(w, stem_len) > 1 {
                w.truncate(stem_len);
            }
            return;
        }
    }
}

fn step5a(w: &mut Vec<u8>) {
    if !ends_with(w, "e") {
        return;
    }
    let stem_len = w.len() - 1;
    let m = measure(w, stem_len);
    if m > 1 || (m == 1 && !ends_cvc(w, stem_len)) {
        w.pop();
    }
}

fn step5b(w: &mut Vec<u8>) {
    let len = w.len();
    if w[len - 1] == b'l' && ends_double_consonant(w, len) && measure(w, len) > 1 {
        w.pop();
    }
}
