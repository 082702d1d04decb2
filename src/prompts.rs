//! Plantillas de prompts del asistente.

use std::collections::HashSet;

/// Respuesta fija para preguntas clasificadas como irrelevantes.
pub const IRRELEVANT_REPLY: &str = "Lo siento, sólo puedo ayudarte con dudas académicas de la asignatura \
(teoría, información de la materia o ejercicios prácticos). ¿Puedes reformular tu pregunta?";

/// Texto que sustituye al contexto cuando la recuperación no devuelve nada.
pub const NO_CONTEXT: &str = "No se proporcionó contexto documental.";

/// Elimina fragmentos repetidos conservando el orden de primera aparición.
pub fn dedup_fragments<I, S>(fragments: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    fragments
        .into_iter()
        .map(|f| f.as_ref().trim().to_string())
        .filter(|f| !f.is_empty() && seen.insert(f.clone()))
        .collect()
}

pub fn classification_prompt(context: &str, question: &str) -> String {
    format!(
        r#"Eres un asistente académico experto en clasificar consultas educativas y en reformular preguntas con claridad.

Contexto (mensajes anteriores del usuario):
{context}

Pregunta del usuario:
{question}

El último mensaje es la pregunta principal; los mensajes anteriores son el contexto necesario para entenderla.
Devuelve un JSON con exactamente dos claves:

- "category": una sola de estas cuatro opciones:
    - "teoria": explicaciones conceptuales o marcos teóricos.
    - "informacion": organización de la asignatura, fechas, normas, bibliografía, evaluación.
    - "practica": ejercicios, problemas, preguntas de examen o cualquier cosa que requiera resolución.
    - "irrelevante": no tiene relación con la asignatura de programación o es ofensivo. En ese caso
      devuelve la misma palabra "irrelevante" como pregunta reformulada.

- "rewrite_question": la última pregunta reformulada para que se entienda por sí sola, incorporando la
  información necesaria de la conversación.

Reglas para la reformulación:
- No añadas información que no aparezca explícitamente en la conversación.
- Si la pregunta depende del contexto anterior, intégralo.
- Ejemplo: "¿Cuándo es el examen?" / "El día 5." / "¿Qué entra?" se reformula como
  "¿Qué contenidos entran en el examen del día 5?".
- Usa un lenguaje claro, formal y directo.

Salida esperada:
{{"category": "...", "rewrite_question": "..."}}

Devuelve sólo el JSON en texto plano, sin bloques de código."#
    )
}

pub fn grounded_answer_prompt(question: &str, fragments: &[String]) -> String {
    let context = if fragments.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        fragments.join("\n\n")
    };
    format!(
        r#"Eres un asistente académico experto. Se te hará una pregunta y dispones de fragmentos de documentos como contexto.

Tu tarea:
1. Analiza el contexto documental proporcionado.
2. Decide si el contexto es suficiente y adecuado para responder.
3. Si lo es, responde **sólo a partir de ese contexto**.
4. Si no lo es pero conoces la respuesta por conocimiento general, respóndela con claridad e indícalo.
5. Si no puedes responder con seguridad, di explícitamente que no dispones de información suficiente.

Requisitos:
- Si usas el contexto, cita brevemente el contenido relevante sin inventar.
- No inventes datos que no estén ni en el contexto ni en tu conocimiento general.
- Responde con un tono académico, claro y preciso.

Pregunta:
{question}

Contexto:
{context}

Respuesta:"#,
        question = question.trim(),
        context = context.trim()
    )
}

/// `summaries` son pares (ruta relativa, resumen) del árbol aplanado.
pub fn file_selection_prompt(question: &str, summaries: &[(String, String)]) -> String {
    let listing: String = summaries
        .iter()
        .map(|(path, summary)| format!("\nArchivo: {path}\n{}\n", indent(summary.trim(), "    ")))
        .collect();
    format!(
        r#"Eres un asistente académico encargado de identificar qué archivos son relevantes para responder a la consulta de un estudiante.

Cada archivo tiene una ruta completa con el formato "carpeta/subcarpeta/.../nombre_de_archivo" y un resumen de su contenido.

Devuelve únicamente una lista JSON con las rutas completas de los archivos que contengan información útil para responder.

Reglas:
- No supongas contenido que no esté explícitamente en los resúmenes.
- Si ningún archivo es útil, devuelve una lista vacía: []
- No justifiques la respuesta.

Formato de salida:
["carpeta/archivo1", "carpeta/subcarpeta/archivo2"]

Consulta del usuario:
"""
{question}
"""

Resúmenes disponibles:
{listing}

Incluye sólo los archivos de los que estés seguro."#,
        question = question.trim(),
        listing = listing.trim()
    )
}

/// `sources` son pares (origen, contenido completo) de los ficheros elegidos.
pub fn practice_answer_prompt(question: &str, sources: &[(String, String)]) -> String {
    let context = if sources.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        sources
            .iter()
            .map(|(source, content)| format!("\nFuente: {source}\n{}\n", indent(content.trim(), "    ")))
            .collect()
    };
    format!(
        r#"Eres un asistente académico con conocimientos avanzados de programación y buenas prácticas de desarrollo de software.

Genera una respuesta clara, precisa y de calidad a la consulta del usuario usando exclusivamente los documentos de contexto.

Reglas:
- Usa únicamente el contenido de los documentos.
- Adopta un tono académico, técnico y profesional.
- Aplica principios de diseño limpio cuando sea relevante.
- No inventes información ni supongas detalles que no estén en el contexto.
- Si la consulta no puede responderse con el contexto, indícalo explícitamente.

Consulta del usuario:
"""
{question}
"""

Contexto disponible:
{context}

Escribe una respuesta detallada con el estilo académico y técnico apropiado."#,
        question = question.trim(),
        context = context.trim()
    )
}

pub fn summary_prompt(document: &str) -> String {
    format!(
        r#"Actúa como experto en comprensión de textos técnicos y pedagógicos. Analiza y resume el siguiente documento para que un modelo educativo pueda decidir más tarde si es útil para responder preguntas sobre su contenido. Puede contener teoría, ejercicios, soluciones o código.

El resumen debe cubrir:
1. Propósito del documento: tema principal, área de conocimiento y nivel académico si se deduce.
2. Enunciados de ejercicios, si los hay: cuántos son y de qué trata cada uno.
3. Soluciones, si están presentes: cómo se resuelven y qué conceptos aplican.
4. Contenido de programación, si aplica: qué implementa el código y cuál parece su objetivo.
5. Observaciones pedagógicas opcionales: patrones o temas recurrentes.

No inventes contenido. Si un fragmento no se entiende, indícalo como "no interpretable".

Documento a resumir:
```
{document}
```"#
    )
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| if line.is_empty() { line.to_string() } else { format!("{prefix}{line}") })
        .collect::<Vec<_>>()
        .join("\n")
}
